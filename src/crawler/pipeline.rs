//! Extraction pipeline
//!
//! Drives one page driver session through a single scope:
//! `Init -> Navigate -> Expand -> CollectPage* -> Done | Failed`.
//! The pipeline has no side effects outside the driver; its snapshot is
//! handed to the reconciliation engine afterwards.

use crate::config::{Config, SiteProfile};
use crate::crawler::retry::RetryPolicy;
use crate::driver::{CollectedItem, DriverError, DriverResult, Locator, PageDriver};
use crate::model::{parse_first_number, split_count_hint, Confidence, CrawlJob, ExtractedEntity};
use crate::state::{PipelineStage, StageTracker};
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Why a scope produced no snapshot
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// The page never showed a usable container; retrying will not help
    #[error("structural failure in {scope}: {reason}")]
    Structural { scope: String, reason: String },

    /// A driver call kept failing after every retry
    #[error("transient failure in {scope} during {stage}: {source}")]
    Transient {
        scope: String,
        stage: PipelineStage,
        #[source]
        source: DriverError,
    },
}

impl ExtractionFailure {
    pub fn scope(&self) -> &str {
        match self {
            Self::Structural { scope, .. } | Self::Transient { scope, .. } => scope,
        }
    }

    /// True when the worker's session should be recreated before its next job
    pub fn is_session_related(&self) -> bool {
        matches!(self, Self::Transient { source, .. } if source.is_session_related())
    }
}

/// The result of a successful extraction
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub scope: String,
    pub entities: Vec<ExtractedEntity>,
    pub confidence: Confidence,
    pub pages: u32,
    /// Why the snapshot cannot be trusted for tombstoning, when degraded
    pub degraded_reason: Option<String>,
}

impl Snapshot {
    fn degrade(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Degraded extraction for {}: {}", self.scope, reason);
        self.confidence = Confidence::Degraded;
        if self.degraded_reason.is_none() {
            self.degraded_reason = Some(reason);
        }
    }
}

/// Runs driver calls under a timeout
async fn bounded<T, Fut>(limit: Duration, fut: Fut) -> DriverResult<T>
where
    Fut: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout(limit)),
    }
}

/// Site-driven extraction of one scope at a time
pub struct ExtractionPipeline {
    profile: SiteProfile,
    retry: RetryPolicy,
    op_timeout: Duration,
    max_pages: u32,
}

impl ExtractionPipeline {
    pub fn new(profile: SiteProfile, retry: RetryPolicy, op_timeout: Duration, max_pages: u32) -> Self {
        Self {
            profile,
            retry,
            op_timeout,
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.site.clone(),
            RetryPolicy::from_config(&config.crawler),
            Duration::from_millis(config.crawler.operation_timeout_ms),
            config.crawler.max_pages,
        )
    }

    /// Extracts every entity of `job`'s scope through `driver`
    ///
    /// # Returns
    ///
    /// * `Ok(Snapshot)` - Full or degraded snapshot of the scope
    /// * `Err(ExtractionFailure)` - Structural or transient failure
    pub async fn run(
        &self,
        driver: &dyn PageDriver,
        job: &CrawlJob,
    ) -> Result<Snapshot, ExtractionFailure> {
        let mut tracker = StageTracker::new(&job.scope_id);

        match self.extract(driver, job, &mut tracker).await {
            Ok(snapshot) => {
                self.advance(&mut tracker, PipelineStage::Done)?;
                tracing::debug!(
                    "Extracted {} entities from {} over {} page(s) ({})",
                    snapshot.entities.len(),
                    job.scope_id,
                    snapshot.pages,
                    snapshot.confidence
                );
                Ok(snapshot)
            }
            Err(failure) => {
                let _ = tracker.advance(PipelineStage::Failed);
                Err(failure)
            }
        }
    }

    async fn extract(
        &self,
        driver: &dyn PageDriver,
        job: &CrawlJob,
        tracker: &mut StageTracker,
    ) -> Result<Snapshot, ExtractionFailure> {
        let scope = job.scope_id.as_str();
        let timeout = self.op_timeout;

        self.advance(tracker, PipelineStage::Navigate)?;
        let url = job.source_locator.as_str();
        self.call(&format!("navigate {}", scope), || {
            bounded(timeout, driver.navigate(url))
        })
        .await
        .map_err(|e| self.classify(scope, PipelineStage::Navigate, e))?;

        self.advance(tracker, PipelineStage::Expand)?;
        for control in &self.profile.expand {
            let locator = Locator::css(control.as_str());
            let clicked = self
                .call(&format!("expand {} in {}", control, scope), || {
                    bounded(timeout, driver.click(&locator))
                })
                .await;

            match clicked {
                Ok(()) => {}
                Err(DriverError::NotFound(_)) => {
                    tracing::debug!("Nothing to expand for {} in {}", control, scope);
                }
                Err(e) => return Err(self.classify(scope, PipelineStage::Expand, e)),
            }
        }

        let mut snapshot = Snapshot {
            scope: scope.to_string(),
            entities: Vec::new(),
            confidence: Confidence::Full,
            pages: 0,
            degraded_reason: None,
        };

        let container = self.locate_container(driver, scope, &mut snapshot).await?;
        let target = self.total_count(driver, scope).await;
        let items = Locator::css(self.profile.item.as_str()).within(container.as_str());
        let mut seen = HashSet::new();

        loop {
            self.advance(tracker, PipelineStage::CollectPage)?;
            snapshot.pages = tracker.pages_collected();

            let page = self
                .call(&format!("collect {} page {}", scope, snapshot.pages), || {
                    bounded(timeout, driver.collect(&items))
                })
                .await
                .map_err(|e| self.classify(scope, PipelineStage::CollectPage, e))?;

            let page_len = page.len();
            self.append_items(job, page, &mut seen, &mut snapshot.entities);

            if page_len < self.profile.page_size as usize {
                break;
            }

            if matches!(target, Some(t) if snapshot.entities.len() >= t as usize) {
                tracing::debug!("Reached target count for {}", scope);
                break;
            }

            let Some(next) = self.profile.next_page.as_deref() else {
                break;
            };

            if snapshot.pages >= self.max_pages {
                snapshot.degrade(format!("page ceiling of {} reached", self.max_pages));
                break;
            }

            let next = Locator::css(next);
            let advanced = self
                .call(&format!("next page of {}", scope), || {
                    bounded(timeout, driver.click(&next))
                })
                .await;

            match advanced {
                Ok(()) => {}
                Err(DriverError::NotFound(_)) => break,
                Err(e) => {
                    snapshot.degrade(format!("next page control failed: {}", e));
                    break;
                }
            }

            let container_locator = Locator::css(container.as_str());
            let reappeared = self
                .call(&format!("wait for {} after paging", scope), || {
                    bounded(self.wait_limit(), driver.wait_for(&container_locator, timeout))
                })
                .await;

            if let Err(e) = reappeared {
                snapshot.degrade(format!("container missing after paging: {}", e));
                break;
            }
        }

        Ok(snapshot)
    }

    /// Finds the primary container, falling back to the secondary one
    async fn locate_container(
        &self,
        driver: &dyn PageDriver,
        scope: &str,
        snapshot: &mut Snapshot,
    ) -> Result<String, ExtractionFailure> {
        let timeout = self.op_timeout;
        let primary = Locator::css(self.profile.primary_container.as_str());

        let primary_error = match self
            .call(&format!("wait for container in {}", scope), || {
                bounded(self.wait_limit(), driver.wait_for(&primary, timeout))
            })
            .await
        {
            Ok(_) => return Ok(self.profile.primary_container.clone()),
            Err(e) if e.is_transient() => {
                return Err(self.classify(scope, PipelineStage::Expand, e))
            }
            Err(e) => e,
        };

        let Some(fallback) = self.profile.fallback_container.as_deref() else {
            return Err(ExtractionFailure::Structural {
                scope: scope.to_string(),
                reason: format!("container never appeared: {}", primary_error),
            });
        };

        let fallback_locator = Locator::css(fallback);
        match self
            .call(&format!("wait for fallback container in {}", scope), || {
                bounded(self.wait_limit(), driver.wait_for(&fallback_locator, timeout))
            })
            .await
        {
            Ok(_) => {
                snapshot.degrade("primary container missing, used fallback");
                Ok(fallback.to_string())
            }
            Err(e) if e.is_transient() => Err(self.classify(scope, PipelineStage::Expand, e)),
            Err(e) => Err(ExtractionFailure::Structural {
                scope: scope.to_string(),
                reason: format!("no container appeared: {}; {}", primary_error, e),
            }),
        }
    }

    /// Reads the advertised total, if the site shows one
    async fn total_count(&self, driver: &dyn PageDriver, scope: &str) -> Option<u32> {
        let selector = self.profile.total_count.as_deref()?;
        let locator = Locator::css(selector);
        let timeout = self.op_timeout;

        match self
            .call(&format!("read total count of {}", scope), || {
                bounded(timeout, driver.collect(&locator))
            })
            .await
        {
            Ok(items) => items.first().and_then(|item| parse_first_number(&item.text)),
            Err(e) => {
                tracing::debug!("No total count for {}: {}", scope, e);
                None
            }
        }
    }

    fn append_items(
        &self,
        job: &CrawlJob,
        page: Vec<CollectedItem>,
        seen: &mut HashSet<String>,
        entities: &mut Vec<ExtractedEntity>,
    ) {
        for item in page {
            let Some(slug) = item.id else {
                tracing::debug!("Skipping item without id in {}: {}", job.scope_id, item.text);
                continue;
            };

            if !seen.insert(slug.clone()) {
                continue;
            }

            let (name, count_hint) = split_count_hint(&item.text);
            entities.push(ExtractedEntity {
                name,
                slug,
                scope: job.scope_id.clone(),
                priority: entities.len() as u32,
                count_hint,
                extracted_at: Utc::now(),
            });
        }
    }

    /// Outer bound for `wait_for`: the wait itself plus one in-flight call
    fn wait_limit(&self) -> Duration {
        self.op_timeout.saturating_mul(2)
    }

    async fn call<T, F, Fut>(&self, label: &str, op: F) -> DriverResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        self.retry.run_if(label, DriverError::is_transient, op).await
    }

    fn advance(
        &self,
        tracker: &mut StageTracker,
        next: PipelineStage,
    ) -> Result<(), ExtractionFailure> {
        tracker
            .advance(next)
            .map_err(|e| ExtractionFailure::Structural {
                scope: tracker.scope().to_string(),
                reason: e.to_string(),
            })
    }

    fn classify(&self, scope: &str, stage: PipelineStage, error: DriverError) -> ExtractionFailure {
        if error.is_transient() {
            ExtractionFailure::Transient {
                scope: scope.to_string(),
                stage,
                source: error,
            }
        } else {
            ExtractionFailure::Structural {
                scope: scope.to_string(),
                reason: error.to_string(),
            }
        }
    }
}
