//! Storage module for the catalog document store
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Entity upsert, bulk patch and lookup (the reconciliation primitives)
//! - The job directory the batches are built from
//! - Review flags for scopes reconciled from degraded extractions

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    CatalogStatistics, EntityStore, JobSource, ReviewLog, StorageError, StorageResult,
};

use crate::model::Confidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique key of a persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub slug: String,
    pub scope: String,
}

impl EntityKey {
    pub fn new(slug: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            scope: scope.into(),
        }
    }
}

/// Free-form details refreshed on every sighting, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMetadata {
    pub name: String,
    pub priority: u32,
    pub count_hint: Option<u32>,
    pub parent_scope: Option<String>,
    pub confidence: Confidence,
    pub extracted_at: DateTime<Utc>,
}

/// The writable part of an entity record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDocument {
    pub active: bool,
    pub featured: bool,
    pub metadata: EntityMetadata,
}

/// A durable entity record; `featured = false` is the tombstone state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntityRecord {
    pub slug: String,
    pub scope: String,
    pub active: bool,
    pub featured: bool,
    pub metadata: EntityMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedEntityRecord {
    pub fn is_tombstoned(&self) -> bool {
        !self.featured
    }
}

/// Whether an upsert created the record or refreshed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Record selection for `find` and `update_many`
///
/// Unset fields do not constrain the selection. An empty `slugs` list
/// matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub scope: Option<String>,
    pub slugs: Option<Vec<String>>,
    pub active: Option<bool>,
    pub featured: Option<bool>,
}

impl EntityFilter {
    pub fn in_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }

    pub fn slugs(mut self, slugs: Vec<String>) -> Self {
        self.slugs = Some(slugs);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }
}

/// Fields to overwrite in `update_many`; `updated_at` is always refreshed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityPatch {
    pub active: Option<bool>,
    pub featured: Option<bool>,
}

impl EntityPatch {
    pub fn tombstone() -> Self {
        Self {
            active: None,
            featured: Some(false),
        }
    }
}

/// Filter for the job directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Matches the scope itself or any scope whose parent it is
    pub scope: Option<String>,
}

/// A scope marked for manual review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewFlag {
    pub scope: String,
    pub batch_id: String,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

/// Per-scope entity counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSummary {
    pub scope: String,
    pub featured: u64,
    pub tombstoned: u64,
}
