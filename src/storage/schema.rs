//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the catalog database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Scopes the batches are built from (categories, subcategories)
CREATE TABLE IF NOT EXISTS directory (
    scope_id TEXT PRIMARY KEY,
    parent_scope TEXT,
    source_locator TEXT NOT NULL,
    ordinal INTEGER NOT NULL DEFAULT 0,
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_directory_parent ON directory(parent_scope);
CREATE INDEX IF NOT EXISTS idx_directory_ordinal ON directory(ordinal);

-- Reconciled catalog entities; featured = 0 is the tombstone state
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL,
    scope TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    featured INTEGER NOT NULL DEFAULT 1,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(slug, scope)
);

CREATE INDEX IF NOT EXISTS idx_entities_scope ON entities(scope);
CREATE INDEX IF NOT EXISTS idx_entities_scope_featured ON entities(scope, featured);

-- Scopes reconciled from degraded extractions
CREATE TABLE IF NOT EXISTS review_flags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    flagged_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_flags_scope ON review_flags(scope);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
