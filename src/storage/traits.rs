//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types.

use crate::model::CrawlJob;
use crate::storage::{
    EntityDocument, EntityFilter, EntityKey, EntityPatch, JobFilter, PersistedEntityRecord,
    ReviewFlag, ScopeSummary, UpsertOutcome,
};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned by a panicked worker")]
    LockPoisoned,
}

impl StorageError {
    /// Returns true when the store itself cannot be reached or written
    ///
    /// These errors abort a batch once retries are exhausted; every other
    /// storage error only fails the job that hit it.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Io(_) | Self::LockPoisoned => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::ReadOnly
                    | ErrorCode::PermissionDenied
                    | ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Document store primitives used by the reconciliation engine
///
/// Records are keyed by `(slug, scope)` and are never physically deleted
/// through this interface.
pub trait EntityStore {
    /// Inserts the document under `key`, or overwrites the existing one
    ///
    /// `created_at` is preserved on update; `updated_at` is always refreshed.
    fn upsert(&mut self, key: &EntityKey, document: &EntityDocument)
        -> StorageResult<UpsertOutcome>;

    /// Applies `patch` to every record matching `filter`
    ///
    /// # Returns
    ///
    /// The number of records modified
    fn update_many(&mut self, filter: &EntityFilter, patch: &EntityPatch) -> StorageResult<u64>;

    /// Returns every record matching `filter`, ordered by scope then slug
    fn find(&self, filter: &EntityFilter) -> StorageResult<Vec<PersistedEntityRecord>>;

    /// Runs `f` atomically: either every write inside it commits or none does
    fn transaction<T, F>(&mut self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Self) -> StorageResult<T>,
        Self: Sized;
}

/// Source of the ordered crawl jobs a batch is built from
pub trait JobSource {
    /// Lists jobs matching `filter`, ordered by ordinal then scope id
    fn list_jobs(&self, filter: &JobFilter) -> StorageResult<Vec<CrawlJob>>;

    /// Registers a scope, replacing any previous entry with the same id
    fn register_job(&mut self, job: &CrawlJob) -> StorageResult<()>;
}

/// Persistent log of scopes that need a human look
pub trait ReviewLog {
    /// Records that `scope` was reconciled without tombstoning in `batch_id`
    fn flag_for_review(&mut self, scope: &str, batch_id: &str, reason: &str)
        -> StorageResult<()>;

    /// Lists flags, newest first
    fn list_review_flags(&self) -> StorageResult<Vec<ReviewFlag>>;
}

/// Read-only statistics over the store
pub trait CatalogStatistics {
    /// Featured and tombstoned counts per scope, ordered by scope
    fn scope_summaries(&self) -> StorageResult<Vec<ScopeSummary>>;

    /// Number of scopes registered in the job directory
    fn count_directory(&self) -> StorageResult<u64>;
}
