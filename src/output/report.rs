use crate::model::Confidence;
use chrono::{DateTime, Utc};
use std::fmt;

/// A job whose snapshot was reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    /// Position of the job in the batch
    pub index: usize,
    pub scope: String,
    pub confidence: Confidence,
    pub pages: u32,
    pub entities: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Why a job ended without a committed reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The page never showed a usable container
    Structural,
    /// Driver calls kept failing after every retry
    Transient,
    /// No page driver session could be opened
    Session,
    /// The store rejected the reconciliation
    Reconciliation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::Transient => "transient",
            Self::Session => "session",
            Self::Reconciliation => "reconciliation",
        };
        write!(f, "{}", name)
    }
}

/// A job that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub index: usize,
    pub scope: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// A scope reconciled from a degraded snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewEntry {
    pub scope: String,
    pub reason: String,
}

/// Results collected by one worker, merged into the report at drain
#[derive(Debug, Clone, Default)]
pub struct JobResults {
    pub succeeded: Vec<JobSummary>,
    pub failed: Vec<JobFailure>,
    pub review: Vec<ReviewEntry>,
}

/// Outcome of a whole batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: String,
    pub total_jobs: usize,
    /// First job index this run processed
    pub resumed_from: usize,
    pub succeeded: Vec<JobSummary>,
    pub failed: Vec<JobFailure>,
    pub review: Vec<ReviewEntry>,
    pub added_total: usize,
    pub updated_total: usize,
    pub removed_total: usize,
    /// Stopped by an external signal
    pub interrupted: bool,
    /// Stopped by a fatal error, such as an unreachable store
    pub aborted: Option<String>,
    pub config_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn new(batch_id: impl Into<String>, total_jobs: usize, resumed_from: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            total_jobs,
            resumed_from,
            succeeded: Vec::new(),
            failed: Vec::new(),
            review: Vec::new(),
            added_total: 0,
            updated_total: 0,
            removed_total: 0,
            interrupted: false,
            aborted: None,
            config_hash: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Folds one worker's results into the report, keeping job order
    pub fn merge(&mut self, results: JobResults) {
        for summary in &results.succeeded {
            self.added_total += summary.added;
            self.updated_total += summary.updated;
            self.removed_total += summary.removed;
        }

        self.succeeded.extend(results.succeeded);
        self.failed.extend(results.failed);
        self.review.extend(results.review);

        self.succeeded.sort_by_key(|s| s.index);
        self.failed.sort_by_key(|f| f.index);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Jobs this run was responsible for
    pub fn scheduled(&self) -> usize {
        self.total_jobs.saturating_sub(self.resumed_from)
    }

    /// Scheduled jobs that neither succeeded nor failed
    pub fn unprocessed(&self) -> usize {
        self.scheduled()
            .saturating_sub(self.succeeded.len() + self.failed.len())
    }

    /// Succeeded jobs whose snapshot could not be trusted for tombstoning
    pub fn degraded(&self) -> usize {
        self.succeeded
            .iter()
            .filter(|s| !s.confidence.is_full())
            .count()
    }

    /// True only when every scheduled job reconciled and nothing stopped the batch
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && !self.interrupted
            && self.aborted.is_none()
            && self.unprocessed() == 0
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Prints a batch report to stdout
pub fn print_report(report: &BatchReport) {
    println!("=== Batch {} ===\n", report.batch_id);

    println!("Jobs:");
    println!("  Total in batch: {}", report.total_jobs);
    if report.resumed_from > 0 {
        println!("  Resumed from index: {}", report.resumed_from);
    }
    println!("  Succeeded: {}", report.succeeded.len());
    if report.degraded() > 0 {
        println!("  Degraded: {}", report.degraded());
    }
    println!("  Failed: {}", report.failed.len());
    if report.unprocessed() > 0 {
        println!("  Not processed: {}", report.unprocessed());
    }
    println!();

    println!("Entities:");
    println!("  Added: {}", report.added_total);
    println!("  Updated: {}", report.updated_total);
    println!("  Tombstoned: {}", report.removed_total);
    println!();

    if !report.failed.is_empty() {
        println!("Failed Jobs:");
        for failure in &report.failed {
            println!(
                "  [{}] {} ({}): {}",
                failure.index, failure.scope, failure.kind, failure.reason
            );
        }
        println!();
    }

    if !report.review.is_empty() {
        println!("Flagged for Review:");
        for entry in &report.review {
            println!("  - {}: {}", entry.scope, entry.reason);
        }
        println!();
    }

    if let Some(reason) = &report.aborted {
        println!("Batch ABORTED: {}", reason);
    } else if report.interrupted {
        println!("Batch INTERRUPTED; rerun to resume from the last checkpoint");
    } else if report.is_clean() {
        println!("Batch completed cleanly");
    } else {
        println!("Batch completed with failures");
    }
}
