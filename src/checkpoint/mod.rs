//! Checkpoint module for resumable batches
//!
//! A checkpoint records the last job index whose reconciliation committed,
//! so a crashed or interrupted batch can resume without skipping work. At
//! most one job is reprocessed on resume.

mod file;

pub use file::FileCheckpointStore;

use crate::model::CrawlJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while reading or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed checkpoint: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Progress persisted for one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch_id: String,
    pub last_completed_index: usize,
    pub consecutive_units_since_restart: u32,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Index the next run of this batch starts from
    pub fn resume_index(&self) -> usize {
        self.last_completed_index + 1
    }

    pub fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            consecutive_units_since_restart: self.consecutive_units_since_restart,
        }
    }
}

/// Extra state saved alongside the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub consecutive_units_since_restart: u32,
}

/// Durable progress store keyed by batch id
pub trait CheckpointStore: Send + Sync {
    /// Records `index` as the last completed job of `batch_id`
    fn save(&self, batch_id: &str, index: usize, meta: CheckpointMeta) -> CheckpointResult<()>;

    /// Loads the checkpoint for `batch_id`, if one exists
    fn load(&self, batch_id: &str) -> CheckpointResult<Option<Checkpoint>>;

    /// Removes the checkpoint for `batch_id`; a missing checkpoint is not an error
    fn clear(&self, batch_id: &str) -> CheckpointResult<()>;
}

/// Derives a stable batch id from the ordered job list
///
/// Two batches share an id only when they contain the same jobs in the same
/// order, so a checkpoint can never be applied to a different batch.
pub fn batch_id_for(jobs: &[CrawlJob]) -> String {
    let mut hasher = Sha256::new();

    for job in jobs {
        hasher.update(job.scope_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(job.parent_scope.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(job.source_locator.as_bytes());
        hasher.update([0x1f]);
        hasher.update(job.ordinal.to_be_bytes());
        hasher.update([0x1e]);
    }

    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
