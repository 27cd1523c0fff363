//! Core data model shared by the pipeline, the reconciliation engine and the
//! worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of work: a single scope (category, subcategory chunk) to extract
///
/// Jobs are immutable once enqueued. Their position in the batch, not the
/// `ordinal`, is the index the checkpoint refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    /// Scope the extracted children belong to
    pub scope_id: String,

    /// Parent of this scope in the catalog hierarchy, if any
    pub parent_scope: Option<String>,

    /// Where the driver should navigate to (a URL for the HTTP driver)
    pub source_locator: String,

    /// Ordering hint from the job source
    pub ordinal: u32,
}

impl CrawlJob {
    pub fn new(scope_id: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            parent_scope: None,
            source_locator: source_locator.into(),
            ordinal: 0,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_scope = Some(parent.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }
}

/// One row produced by a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    pub name: String,
    /// Unique within `scope`
    pub slug: String,
    pub scope: String,
    /// Position in the snapshot, starting at 0
    pub priority: u32,
    /// Item count advertised next to the entity name, e.g. `Bebidas (123)`
    pub count_hint: Option<u32>,
    pub extracted_at: DateTime<Utc>,
}

/// How much an extraction can be trusted
///
/// Only a `Full` extraction is authoritative for its scope; a `Degraded` one
/// may upsert but never tombstones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Full,
    Degraded,
}

impl Confidence {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Splits an item label into its name and trailing count hint
///
/// `"Bebidas (123)"` becomes `("Bebidas", Some(123))`. Labels without a
/// parenthesized number are returned trimmed with no hint.
pub fn split_count_hint(label: &str) -> (String, Option<u32>) {
    let trimmed = label.trim();

    if let Some(open) = trimmed.rfind('(') {
        if let Some(inner) = trimmed[open + 1..].strip_suffix(')') {
            let digits: String = inner.chars().filter(|c| !matches!(c, '.' | ',')).collect();
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(count) = digits.parse::<u32>() {
                    return (trimmed[..open].trim_end().to_string(), Some(count));
                }
            }
        }
    }

    (trimmed.to_string(), None)
}

/// Extracts the first integer from free text such as `"1.234 productos"`
///
/// Thousands separators (`.` and `,`) inside the number are ignored.
pub fn parse_first_number(text: &str) -> Option<u32> {
    let mut digits = String::new();
    let mut started = false;

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            started = true;
        } else if started && matches!(c, '.' | ',') {
            continue;
        } else if started {
            break;
        }
    }

    digits.parse().ok()
}
