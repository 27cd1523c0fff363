//! Crawler module for batch extraction and reconciliation
//!
//! This module contains the core orchestration logic, including:
//! - Retry with exponential backoff
//! - The per-scope extraction pipeline
//! - Job queueing and checkpoint progress tracking
//! - The worker pool that ties it all together

mod coordinator;
mod pipeline;
mod retry;
mod scheduler;

pub use coordinator::WorkerPool;
pub use pipeline::{ExtractionFailure, ExtractionPipeline, Snapshot};
pub use retry::RetryPolicy;
pub use scheduler::{JobQueue, ProgressTracker, QueuedJob};

use crate::checkpoint::{batch_id_for, CheckpointStore, FileCheckpointStore};
use crate::config::{Config, CrawlerConfig};
use crate::driver::HttpDriverFactory;
use crate::model::CrawlJob;
use crate::output::{generate_markdown_summary, BatchReport};
use crate::storage::{JobFilter, JobSource, SqliteStorage, StorageResult};
use crate::CatalogError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options for a single batch run
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Discard the batch checkpoint before running
    pub fresh: bool,

    /// Explicit start index; overrides the checkpoint
    pub resume_from: Option<usize>,

    /// Stops the batch when cancelled
    pub cancel: CancellationToken,

    /// Recorded in the batch summary
    pub config_hash: Option<String>,
}

/// What a batch would do, without running it
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub batch_id: String,
    pub jobs: Vec<CrawlJob>,
    pub resume_from: usize,
}

/// Loads the jobs selected by the crawler's scope filter
pub fn load_jobs<S: JobSource>(storage: &S, crawler: &CrawlerConfig) -> StorageResult<Vec<CrawlJob>> {
    storage.list_jobs(&JobFilter {
        scope: crawler.scope_filter.clone(),
    })
}

/// Builds the batch plan for `config` from the job directory and checkpoints
pub fn plan_batch(config: &Config) -> Result<BatchPlan, CatalogError> {
    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let jobs = load_jobs(&storage, &config.crawler)?;
    let batch_id = batch_id_for(&jobs);

    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_path)?;
    let resume_from = checkpoints
        .load(&batch_id)?
        .map(|c| c.resume_index())
        .unwrap_or(0);

    Ok(BatchPlan {
        batch_id,
        jobs,
        resume_from,
    })
}

/// Runs a complete batch
///
/// This is the main entry point for a sync run. It will:
/// 1. Open the catalog database and load the job directory
/// 2. Resume from the batch checkpoint (or discard it with `fresh`)
/// 3. Run the worker pool over the remaining jobs
/// 4. Write the markdown summary when configured
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `options` - Per-run options
///
/// # Returns
///
/// * `Ok(BatchReport)` - The batch ran; inspect the report for failures
/// * `Err(CatalogError)` - The batch could not be set up
pub async fn crawl(config: &Config, options: CrawlOptions) -> Result<BatchReport, CatalogError> {
    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let jobs = load_jobs(&storage, &config.crawler)?;

    if jobs.is_empty() {
        tracing::warn!("No jobs in the directory; import scopes with --import first");
    }

    let checkpoints = Arc::new(FileCheckpointStore::new(&config.storage.checkpoint_path)?);
    if options.fresh {
        let batch_id = batch_id_for(&jobs);
        tracing::info!("Discarding checkpoint for batch {}", batch_id);
        checkpoints.clear(&batch_id)?;
    }

    let op_timeout = Duration::from_millis(config.crawler.operation_timeout_ms);
    let factory = Arc::new(HttpDriverFactory::new(
        &config.user_agent,
        &config.site,
        op_timeout,
    ));

    let pool = WorkerPool::new(
        Arc::new(Mutex::new(storage)),
        factory,
        checkpoints,
        ExtractionPipeline::from_config(config),
        RetryPolicy::from_config(&config.crawler),
        config.crawler.session_restart_every,
    )
    .with_cancellation(options.cancel);

    let mut report = pool
        .run(
            jobs,
            config.crawler.concurrency as usize,
            options.resume_from,
        )
        .await?;
    report.config_hash = options.config_hash;

    if let Some(path) = &config.storage.summary_path {
        match generate_markdown_summary(&report, &config.site.name, Path::new(path)) {
            Ok(()) => tracing::info!("Wrote batch summary to {}", path),
            Err(e) => tracing::warn!("Failed to write batch summary to {}: {}", path, e),
        }
    }

    Ok(report)
}
