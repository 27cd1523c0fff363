//! Worker pool - main batch orchestration logic
//!
//! This module runs a batch of crawl jobs across a fixed number of workers,
//! including:
//! - Deriving the resume offset from the checkpoint store
//! - Running the extraction pipeline on each worker's own session
//! - Reconciling snapshots and advancing the checkpoint on commit
//! - Restarting sessions per the restart policy
//! - Handling cancellation and fatal store failures

use crate::checkpoint::{batch_id_for, CheckpointMeta, CheckpointStore};
use crate::crawler::pipeline::{ExtractionFailure, ExtractionPipeline, Snapshot};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::{JobQueue, ProgressTracker, QueuedJob};
use crate::driver::{DriverFactory, PageDriver};
use crate::model::CrawlJob;
use crate::output::{BatchReport, FailureKind, JobFailure, JobResults, JobSummary, ReviewEntry};
use crate::reconcile::{ReconcileOutcome, ReconciliationEngine};
use crate::state::SessionState;
use crate::storage::{EntityStore, ReviewLog, StorageError, StorageResult};
use crate::CatalogError;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Runs batches of crawl jobs on a fixed-size pool of workers
pub struct WorkerPool<S> {
    store: Arc<Mutex<S>>,
    factory: Arc<dyn DriverFactory>,
    checkpoints: Arc<dyn CheckpointStore>,
    pipeline: Arc<ExtractionPipeline>,
    engine: ReconciliationEngine,
    retry: RetryPolicy,
    session_restart_every: u32,
    cancel: CancellationToken,
}

/// State shared by the workers of one batch
struct WorkerContext<S> {
    batch_id: String,
    store: Arc<Mutex<S>>,
    factory: Arc<dyn DriverFactory>,
    pipeline: Arc<ExtractionPipeline>,
    engine: ReconciliationEngine,
    retry: RetryPolicy,
    session_restart_every: u32,
    cancel: CancellationToken,
    queue: JobQueue,
    progress: Mutex<ProgressTracker>,
}

/// What one worker hands back when it exits
#[derive(Default)]
struct WorkerOutcome {
    results: JobResults,
    fatal: Option<CatalogError>,
}

impl<S> WorkerPool<S>
where
    S: EntityStore + ReviewLog + Send + 'static,
{
    /// Creates a new worker pool
    ///
    /// # Arguments
    ///
    /// * `store` - Entity store shared by every worker
    /// * `factory` - Opens one page driver session per worker
    /// * `checkpoints` - Durable batch progress
    /// * `pipeline` - Extraction pipeline run for each job
    /// * `retry` - Retry policy for reconciliation
    /// * `session_restart_every` - Jobs a session serves before it is recreated
    pub fn new(
        store: Arc<Mutex<S>>,
        factory: Arc<dyn DriverFactory>,
        checkpoints: Arc<dyn CheckpointStore>,
        pipeline: ExtractionPipeline,
        retry: RetryPolicy,
        session_restart_every: u32,
    ) -> Self {
        Self {
            store,
            factory,
            checkpoints,
            pipeline: Arc::new(pipeline),
            engine: ReconciliationEngine::new(),
            retry,
            session_restart_every,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to stop the batch from outside
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `jobs` on `concurrency` workers until the queue drains
    ///
    /// When `resume_from` is `None` the offset comes from the batch's
    /// checkpoint, or 0 without one. Job failures are recorded in the report;
    /// only setup errors are returned as `Err`.
    pub async fn run(
        &self,
        jobs: Vec<CrawlJob>,
        concurrency: usize,
        resume_from: Option<usize>,
    ) -> Result<BatchReport, CatalogError> {
        let batch_id = batch_id_for(&jobs);

        let start = match resume_from {
            Some(index) => index,
            None => match self.checkpoints.load(&batch_id)? {
                Some(checkpoint) => {
                    tracing::info!(
                        "Resuming batch {} after index {} ({} jobs on the last session)",
                        batch_id,
                        checkpoint.last_completed_index,
                        checkpoint.meta().consecutive_units_since_restart
                    );
                    checkpoint.resume_index()
                }
                None => 0,
            },
        };

        if start > jobs.len() {
            return Err(CatalogError::InvalidResume {
                index: start,
                len: jobs.len(),
            });
        }

        let mut report = BatchReport::new(&batch_id, jobs.len(), start);
        let scheduled = jobs.len() - start;
        let workers = concurrency.max(1);

        tracing::info!(
            "Starting batch {}: {} jobs from index {} on {} workers",
            batch_id,
            scheduled,
            start,
            workers
        );

        let ctx = Arc::new(WorkerContext {
            batch_id: batch_id.clone(),
            store: self.store.clone(),
            factory: self.factory.clone(),
            pipeline: self.pipeline.clone(),
            engine: self.engine,
            retry: self.retry.clone(),
            session_restart_every: self.session_restart_every,
            cancel: self.cancel.clone(),
            queue: JobQueue::from_batch(&jobs, start),
            progress: Mutex::new(ProgressTracker::new(
                &batch_id,
                start,
                scheduled,
                self.checkpoints.clone(),
            )),
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| tokio::spawn(run_worker(ctx.clone(), worker_id)))
            .collect();

        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(outcome) => {
                    report.merge(outcome.results);
                    if let Some(fatal) = outcome.fatal {
                        report.aborted.get_or_insert_with(|| fatal.to_string());
                    }
                }
                Err(e) => {
                    let fatal = CatalogError::WorkerPanicked {
                        worker: worker_id,
                        message: e.to_string(),
                    };
                    tracing::error!("{}", fatal);
                    self.cancel.cancel();
                    report.aborted.get_or_insert_with(|| fatal.to_string());
                }
            }
        }

        report.interrupted = self.cancel.is_cancelled() && report.aborted.is_none();
        report.finish();

        if report.is_clean() {
            if let Err(e) = self.checkpoints.clear(&batch_id) {
                tracing::warn!("Failed to clear checkpoint for batch {}: {}", batch_id, e);
            }
        } else {
            let resume = ctx
                .progress
                .lock()
                .map(|p| p.resume_index())
                .unwrap_or(start);
            tracing::info!("Batch {} will resume from index {}", batch_id, resume);
        }

        tracing::info!(
            "Batch {} finished: {} succeeded, {} failed, {} added, {} updated, {} removed",
            batch_id,
            report.succeeded.len(),
            report.failed.len(),
            report.added_total,
            report.updated_total,
            report.removed_total
        );

        Ok(report)
    }
}

impl<S> WorkerContext<S>
where
    S: EntityStore + ReviewLog + Send + 'static,
{
    /// Reconciles a snapshot, retrying while the store is unavailable
    async fn reconcile(&self, job: &CrawlJob, snapshot: &Snapshot) -> StorageResult<ReconcileOutcome> {
        let label = format!("reconcile {}", job.scope_id);
        self.retry
            .run_if(&label, StorageError::is_unavailable, || async {
                self.reconcile_once(job, snapshot)
            })
            .await
    }

    fn reconcile_once(&self, job: &CrawlJob, snapshot: &Snapshot) -> StorageResult<ReconcileOutcome> {
        let mut store = self.store.lock().map_err(|_| StorageError::LockPoisoned)?;
        self.engine.reconcile(
            &mut *store,
            &job.scope_id,
            &snapshot.entities,
            snapshot.confidence,
            job.parent_scope.as_deref(),
        )
    }

    fn flag_for_review(&self, scope: &str, reason: &str) {
        let flagged = self
            .store
            .lock()
            .map_err(|_| StorageError::LockPoisoned)
            .and_then(|mut store| store.flag_for_review(scope, &self.batch_id, reason));

        if let Err(e) = flagged {
            tracing::warn!("Failed to persist review flag for {}: {}", scope, e);
        }
    }

    fn complete(&self, index: usize, meta: CheckpointMeta) {
        let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        progress.complete(index, meta);
    }

    fn fail(&self, index: usize) {
        let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        progress.fail(index);
    }
}

async fn close_session(worker_id: usize, driver: Box<dyn PageDriver>) {
    if let Err(e) = driver.close().await {
        tracing::warn!("Worker {} failed to close its session: {}", worker_id, e);
    }
}

/// One worker: pull, extract, reconcile, checkpoint, repeat
async fn run_worker<S>(ctx: Arc<WorkerContext<S>>, worker_id: usize) -> WorkerOutcome
where
    S: EntityStore + ReviewLog + Send + 'static,
{
    let mut outcome = WorkerOutcome::default();
    let mut session: Option<Box<dyn PageDriver>> = None;
    let mut state = SessionState::new(ctx.session_restart_every);

    while !ctx.cancel.is_cancelled() {
        let Some(QueuedJob { index, job }) = ctx.queue.pop().await else {
            break;
        };

        if let Some(reason) = state.restart_due() {
            if let Some(driver) = session.take() {
                tracing::debug!("Worker {} restarting session: {}", worker_id, reason);
                close_session(worker_id, driver).await;
            }
        }

        if session.is_none() {
            match ctx.factory.open(worker_id).await {
                Ok(driver) => {
                    state.record_opened();
                    session = Some(driver);
                }
                Err(e) => {
                    tracing::error!("Worker {} could not open a session: {}", worker_id, e);
                    outcome.results.failed.push(JobFailure {
                        index,
                        scope: job.scope_id.clone(),
                        kind: FailureKind::Session,
                        reason: e.to_string(),
                    });
                    ctx.fail(index);
                    continue;
                }
            }
        }

        let Some(driver) = session.as_deref() else {
            continue;
        };

        tracing::debug!("Worker {} extracting {} (job {})", worker_id, job.scope_id, index);

        let extraction = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            result = ctx.pipeline.run(driver, &job) => Some(result),
        };

        let Some(extraction) = extraction else {
            tracing::info!("Worker {} abandoned {} on cancellation", worker_id, job.scope_id);
            break;
        };

        let snapshot = match extraction {
            Ok(snapshot) => snapshot,
            Err(failure) => {
                if failure.is_session_related() {
                    state.record_session_failure();
                }

                let kind = match &failure {
                    ExtractionFailure::Structural { .. } => FailureKind::Structural,
                    ExtractionFailure::Transient { .. } => FailureKind::Transient,
                };

                tracing::warn!("Job {} failed: {}", index, failure);
                outcome.results.failed.push(JobFailure {
                    index,
                    scope: job.scope_id.clone(),
                    kind,
                    reason: failure.to_string(),
                });
                ctx.fail(index);
                continue;
            }
        };

        match ctx.reconcile(&job, &snapshot).await {
            Ok(reconciled) => {
                state.record_completed();

                if reconciled.needs_review {
                    let reason = snapshot
                        .degraded_reason
                        .clone()
                        .unwrap_or_else(|| "degraded extraction".to_string());
                    ctx.flag_for_review(&job.scope_id, &reason);
                    outcome.results.review.push(ReviewEntry {
                        scope: job.scope_id.clone(),
                        reason,
                    });
                }

                ctx.complete(
                    index,
                    CheckpointMeta {
                        consecutive_units_since_restart: state.units_since_restart,
                    },
                );

                outcome.results.succeeded.push(JobSummary {
                    index,
                    scope: job.scope_id.clone(),
                    confidence: snapshot.confidence,
                    pages: snapshot.pages,
                    entities: snapshot.entities.len(),
                    added: reconciled.added.len(),
                    updated: reconciled.updated.len(),
                    removed: reconciled.removed.len(),
                });
            }
            Err(e) if e.is_unavailable() => {
                tracing::error!(
                    "Store unavailable while reconciling {}, aborting batch: {}",
                    job.scope_id,
                    e
                );
                ctx.cancel.cancel();
                outcome.fatal = Some(CatalogError::StoreUnavailable {
                    scope: job.scope_id.clone(),
                    source: e,
                });
                break;
            }
            Err(e) => {
                tracing::warn!("Reconciliation of {} failed: {}", job.scope_id, e);
                outcome.results.failed.push(JobFailure {
                    index,
                    scope: job.scope_id.clone(),
                    kind: FailureKind::Reconciliation,
                    reason: e.to_string(),
                });
                ctx.fail(index);
            }
        }
    }

    if let Some(driver) = session.take() {
        close_session(worker_id, driver).await;
    }

    outcome
}
