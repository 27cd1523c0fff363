use crate::model::{Confidence, ExtractedEntity};
use crate::reconcile::ReconcileOutcome;
use crate::storage::{
    EntityDocument, EntityFilter, EntityKey, EntityMetadata, EntityPatch, EntityStore,
    StorageResult, UpsertOutcome,
};
use std::collections::{BTreeSet, HashSet};

/// Applies snapshots to an [`EntityStore`] with upsert and tombstone semantics
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Reconciles one scope's snapshot inside a single store transaction
    ///
    /// # Arguments
    ///
    /// * `store` - The entity store to write to
    /// * `scope` - Scope the snapshot was extracted from
    /// * `snapshot` - Entities seen, in priority order
    /// * `confidence` - Only `Full` snapshots may tombstone
    /// * `parent_scope` - Recorded in each entity's metadata
    ///
    /// # Returns
    ///
    /// * `Ok(ReconcileOutcome)` - Everything committed
    /// * `Err(StorageError)` - Nothing committed
    pub fn reconcile<S: EntityStore>(
        &self,
        store: &mut S,
        scope: &str,
        snapshot: &[ExtractedEntity],
        confidence: Confidence,
        parent_scope: Option<&str>,
    ) -> StorageResult<ReconcileOutcome> {
        let outcome = store.transaction(|tx| {
            Self::apply(tx, scope, snapshot, confidence, parent_scope)
        })?;

        tracing::debug!(
            "Reconciled {} ({}): {} added, {} updated, {} removed",
            scope,
            confidence,
            outcome.added.len(),
            outcome.updated.len(),
            outcome.removed.len()
        );

        Ok(outcome)
    }

    fn apply<S: EntityStore>(
        tx: &mut S,
        scope: &str,
        snapshot: &[ExtractedEntity],
        confidence: Confidence,
        parent_scope: Option<&str>,
    ) -> StorageResult<ReconcileOutcome> {
        let existing: BTreeSet<String> = tx
            .find(&EntityFilter::in_scope(scope).featured(true))?
            .into_iter()
            .map(|record| record.slug)
            .collect();

        let mut outcome = ReconcileOutcome {
            scope: scope.to_string(),
            ..ReconcileOutcome::default()
        };
        let mut seen = HashSet::new();

        for entity in snapshot {
            if !seen.insert(entity.slug.as_str()) {
                continue;
            }

            let document = EntityDocument {
                active: true,
                featured: true,
                metadata: EntityMetadata {
                    name: entity.name.clone(),
                    priority: entity.priority,
                    count_hint: entity.count_hint,
                    parent_scope: parent_scope.map(str::to_string),
                    confidence,
                    extracted_at: entity.extracted_at,
                },
            };

            match tx.upsert(&EntityKey::new(entity.slug.as_str(), scope), &document)? {
                UpsertOutcome::Inserted => outcome.added.push(entity.slug.clone()),
                UpsertOutcome::Updated => outcome.updated.push(entity.slug.clone()),
            }
        }

        let missing: Vec<String> = existing
            .into_iter()
            .filter(|slug| !seen.contains(slug.as_str()))
            .collect();

        match confidence {
            Confidence::Full => {
                if !missing.is_empty() {
                    tx.update_many(
                        &EntityFilter::in_scope(scope)
                            .slugs(missing.clone())
                            .featured(true),
                        &EntityPatch::tombstone(),
                    )?;
                }
                outcome.removed = missing;
            }
            Confidence::Degraded => {
                if !missing.is_empty() {
                    tracing::warn!(
                        "Degraded snapshot for {}: leaving {} unseen entities untouched",
                        scope,
                        missing.len()
                    );
                }
                outcome.needs_review = true;
            }
        }

        outcome.added.sort();
        outcome.updated.sort();
        Ok(outcome)
    }
}
