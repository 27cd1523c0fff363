//! Reconciliation of extraction snapshots against the entity store
//!
//! Every entity seen in a snapshot is upserted. Entities that were active in
//! the store but are missing from a `Full` snapshot are tombstoned
//! (`featured = false`); nothing is ever physically deleted. A `Degraded`
//! snapshot never tombstones and flags its scope for review instead.

mod engine;

pub use engine::ReconciliationEngine;

/// What one reconciliation changed, with slugs sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub scope: String,
    /// Slugs stored for the first time
    pub added: Vec<String>,
    /// Slugs that already had a record (including revived tombstones)
    pub updated: Vec<String>,
    /// Slugs tombstoned by this reconciliation
    pub removed: Vec<String>,
    /// Set for degraded snapshots; the caller records a review flag
    pub needs_review: bool,
}
