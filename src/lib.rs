//! catalog-sync: crawl orchestration and reconciliation for retail catalogs
//!
//! This crate drives many extraction sessions in parallel against a catalog
//! directory (categories, subcategories, product types), retries transient
//! failures with backoff, checkpoints progress so long batches can resume, and
//! reconciles every extraction against a persistent store with upsert and
//! tombstone semantics.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod driver;
pub mod model;
pub mod output;
pub mod reconcile;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for catalog-sync operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Store unavailable while reconciling scope {scope}: {source}")]
    StoreUnavailable {
        scope: String,
        source: storage::StorageError,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PipelineStage,
        to: state::PipelineStage,
    },

    #[error("Resume index {index} is past the end of a batch of {len} jobs")]
    InvalidResume { index: usize, len: usize },

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for catalog-sync operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{Confidence, CrawlJob, ExtractedEntity};
pub use output::BatchReport;
pub use state::PipelineStage;
