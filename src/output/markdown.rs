//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of one batch,
//! including job outcomes, entity changes, failures and review flags.

use crate::output::report::BatchReport;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of `report` to `output_path`
///
/// # Arguments
///
/// * `report` - The finished batch report
/// * `site` - Site name shown in the title
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(
    report: &BatchReport,
    site: &str,
    output_path: &Path,
) -> std::io::Result<()> {
    let markdown = format_markdown_summary(report, site);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a batch report as markdown
pub fn format_markdown_summary(report: &BatchReport, site: &str) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {} Catalog Sync Summary\n\n", site));

    // Batch metadata
    md.push_str("## Batch Information\n\n");
    md.push_str(&format!("- **Batch ID**: {}\n", report.batch_id));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    if let Some(finished) = report.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = report.duration_seconds() {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", status(report)));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Job counts
    md.push_str("## Jobs\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Total in batch | {} |\n", report.total_jobs));
    md.push_str(&format!("| Resumed from | {} |\n", report.resumed_from));
    md.push_str(&format!("| Succeeded | {} |\n", report.succeeded.len()));
    md.push_str(&format!("| Failed | {} |\n", report.failed.len()));
    md.push_str(&format!("| Not processed | {} |\n\n", report.unprocessed()));

    // Entity changes
    md.push_str("## Entity Changes\n\n");
    md.push_str(&format!("- **Added**: {}\n", report.added_total));
    md.push_str(&format!("- **Updated**: {}\n", report.updated_total));
    md.push_str(&format!("- **Tombstoned**: {}\n\n", report.removed_total));

    if !report.succeeded.is_empty() {
        md.push_str("## Scopes\n\n");
        md.push_str("| # | Scope | Confidence | Pages | Entities | Added | Updated | Removed |\n");
        md.push_str("|---|-------|------------|-------|----------|-------|---------|---------|\n");

        for job in &report.succeeded {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                job.index,
                job.scope,
                job.confidence,
                job.pages,
                job.entities,
                job.added,
                job.updated,
                job.removed
            ));
        }
        md.push('\n');
    }

    if !report.failed.is_empty() {
        md.push_str("## Failed Jobs\n\n");
        md.push_str("| # | Scope | Kind | Reason |\n");
        md.push_str("|---|-------|------|--------|\n");

        for failure in &report.failed {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failure.index,
                failure.scope,
                failure.kind,
                failure.reason.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    if !report.review.is_empty() {
        md.push_str("## Flagged for Review\n\n");
        for entry in &report.review {
            md.push_str(&format!("- **{}**: {}\n", entry.scope, entry.reason));
        }
        md.push('\n');
    }

    md
}

fn status(report: &BatchReport) -> String {
    if let Some(reason) = &report.aborted {
        format!("aborted ({})", reason)
    } else if report.interrupted {
        "interrupted".to_string()
    } else if report.is_clean() {
        "completed".to_string()
    } else {
        "completed with failures".to_string()
    }
}
