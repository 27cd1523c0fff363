//! Retry with exponential backoff
//!
//! Every driver call in the pipeline and every reconciliation goes through
//! one [`RetryPolicy`] instead of ad hoc retry loops.

use crate::config::CrawlerConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with jitter
///
/// The delay before retry `n` (starting at 0) is `base_delay * 2^n` plus up
/// to 25% jitter, never exceeding `max_delay`. After `max_retries` retries
/// the last error is returned.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay to sleep before retry number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let mut delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter {
            let jitter_range = (delay.as_millis() / 4) as u64;
            if jitter_range > 0 {
                delay += Duration::from_millis(fastrand::u64(0..=jitter_range));
            }
        }

        delay.min(self.max_delay)
    }

    /// Runs `op`, retrying every error
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(label, |_| true, op).await
    }

    /// Runs `op`, retrying only errors for which `retryable` returns true
    ///
    /// # Arguments
    ///
    /// * `label` - Operation name used in log lines
    /// * `retryable` - Classifies an error as worth another attempt
    /// * `op` - Produces a fresh future for each attempt
    pub async fn run_if<T, E, F, Fut, P>(&self, label: &str, retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::warn!("{} failed after {} attempts: {}", label, attempt + 1, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
