//! Output module for batch reports and catalog summaries
//!
//! This module handles:
//! - The batch report aggregated from per-worker results
//! - Generating markdown summaries of a batch
//! - Printing catalog statistics and review flags

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use report::{
    print_report, BatchReport, FailureKind, JobFailure, JobResults, JobSummary, ReviewEntry,
};
pub use stats::{load_statistics, print_review_flags, print_statistics, CatalogStats};
