//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::model::CrawlJob;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CatalogStatistics, EntityStore, JobSource, ReviewLog, StorageError, StorageResult,
};
use crate::storage::{
    EntityDocument, EntityFilter, EntityKey, EntityMetadata, EntityPatch, JobFilter,
    PersistedEntityRecord, ReviewFlag, ScopeSummary, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the catalog database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection, for tests that need to tamper with the schema
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Builds the WHERE clause and its bound values for an entity filter
fn entity_where_clause(filter: &EntityFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(scope) = &filter.scope {
        clauses.push("scope = ?".to_string());
        values.push(Value::Text(scope.clone()));
    }

    if let Some(active) = filter.active {
        clauses.push("active = ?".to_string());
        values.push(Value::Integer(active as i64));
    }

    if let Some(featured) = filter.featured {
        clauses.push("featured = ?".to_string());
        values.push(Value::Integer(featured as i64));
    }

    if let Some(slugs) = &filter.slugs {
        if slugs.is_empty() {
            clauses.push("1 = 0".to_string());
        } else {
            let placeholders = vec!["?"; slugs.len()].join(", ");
            clauses.push(format!("slug IN ({})", placeholders));
            values.extend(slugs.iter().cloned().map(Value::Text));
        }
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedEntityRecord> {
    let metadata_json: String = row.get(4)?;
    let metadata: EntityMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(PersistedEntityRecord {
        slug: row.get(0)?,
        scope: row.get(1)?,
        active: row.get(2)?,
        featured: row.get(3)?,
        metadata,
        created_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
    })
}

impl EntityStore for SqliteStorage {
    fn upsert(
        &mut self,
        key: &EntityKey,
        document: &EntityDocument,
    ) -> StorageResult<UpsertOutcome> {
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let existed = self
            .conn
            .query_row(
                "SELECT 1 FROM entities WHERE slug = ?1 AND scope = ?2",
                params![key.slug, key.scope],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        self.conn.execute(
            "INSERT INTO entities (slug, scope, active, featured, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(slug, scope) DO UPDATE SET
                active = excluded.active,
                featured = excluded.featured,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                key.slug,
                key.scope,
                document.active,
                document.featured,
                metadata,
                now
            ],
        )?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn update_many(&mut self, filter: &EntityFilter, patch: &EntityPatch) -> StorageResult<u64> {
        let (where_clause, filter_values) = entity_where_clause(filter);

        let optional_flag = |flag: Option<bool>| match flag {
            Some(v) => Value::Integer(v as i64),
            None => Value::Null,
        };

        let mut values = vec![
            optional_flag(patch.active),
            optional_flag(patch.featured),
            Value::Text(Utc::now().to_rfc3339()),
        ];
        values.extend(filter_values);

        let sql = format!(
            "UPDATE entities SET active = COALESCE(?, active), featured = COALESCE(?, featured),
             updated_at = ?{}",
            where_clause
        );

        let modified = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(modified as u64)
    }

    fn find(&self, filter: &EntityFilter) -> StorageResult<Vec<PersistedEntityRecord>> {
        let (where_clause, values) = entity_where_clause(filter);
        let sql = format!(
            "SELECT slug, scope, active, featured, metadata, created_at, updated_at
             FROM entities{} ORDER BY scope, slug",
            where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn transaction<T, F>(&mut self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Self) -> StorageResult<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;

        let result = f(self).and_then(|value| {
            self.conn.execute_batch("COMMIT")?;
            Ok(value)
        });

        // A failed COMMIT (e.g. a deferred constraint) leaves the transaction open
        if result.is_err() && !self.conn.is_autocommit() {
            if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
        }

        result
    }
}

impl JobSource for SqliteStorage {
    fn list_jobs(&self, filter: &JobFilter) -> StorageResult<Vec<CrawlJob>> {
        let map_row = |row: &Row<'_>| {
            Ok(CrawlJob {
                scope_id: row.get(0)?,
                parent_scope: row.get(1)?,
                source_locator: row.get(2)?,
                ordinal: row.get(3)?,
            })
        };

        let jobs = match &filter.scope {
            Some(scope) => {
                let mut stmt = self.conn.prepare(
                    "SELECT scope_id, parent_scope, source_locator, ordinal FROM directory
                     WHERE scope_id = ?1 OR parent_scope = ?1
                     ORDER BY ordinal, scope_id",
                )?;
                let rows = stmt.query_map(params![scope], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT scope_id, parent_scope, source_locator, ordinal FROM directory
                     ORDER BY ordinal, scope_id",
                )?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(jobs)
    }

    fn register_job(&mut self, job: &CrawlJob) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO directory (scope_id, parent_scope, source_locator, ordinal, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope_id) DO UPDATE SET
                parent_scope = excluded.parent_scope,
                source_locator = excluded.source_locator,
                ordinal = excluded.ordinal",
            params![
                job.scope_id,
                job.parent_scope,
                job.source_locator,
                job.ordinal,
                now
            ],
        )?;
        Ok(())
    }
}

impl ReviewLog for SqliteStorage {
    fn flag_for_review(
        &mut self,
        scope: &str,
        batch_id: &str,
        reason: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO review_flags (scope, batch_id, reason, flagged_at) VALUES (?1, ?2, ?3, ?4)",
            params![scope, batch_id, reason, now],
        )?;
        Ok(())
    }

    fn list_review_flags(&self) -> StorageResult<Vec<ReviewFlag>> {
        let mut stmt = self.conn.prepare(
            "SELECT scope, batch_id, reason, flagged_at FROM review_flags
             ORDER BY flagged_at DESC, id DESC",
        )?;

        let flags = stmt
            .query_map([], |row| {
                Ok(ReviewFlag {
                    scope: row.get(0)?,
                    batch_id: row.get(1)?,
                    reason: row.get(2)?,
                    flagged_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(flags)
    }
}

impl CatalogStatistics for SqliteStorage {
    fn scope_summaries(&self) -> StorageResult<Vec<ScopeSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT scope,
                    SUM(CASE WHEN featured = 1 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN featured = 0 THEN 1 ELSE 0 END)
             FROM entities GROUP BY scope ORDER BY scope",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(ScopeSummary {
                    scope: row.get(0)?,
                    featured: row.get::<_, i64>(1)? as u64,
                    tombstoned: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    fn count_directory(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM directory", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
