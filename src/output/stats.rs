//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics and review flags from the storage layer.

use crate::storage::{CatalogStatistics, ReviewFlag, ScopeSummary, StorageResult};

/// Catalog statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    /// Number of scopes registered in the job directory
    pub directory_size: u64,

    /// Featured and tombstoned counts per scope
    pub scopes: Vec<ScopeSummary>,

    pub featured_total: u64,
    pub tombstoned_total: u64,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStats)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics<S: CatalogStatistics>(storage: &S) -> StorageResult<CatalogStats> {
    let directory_size = storage.count_directory()?;
    let scopes = storage.scope_summaries()?;

    let featured_total = scopes.iter().map(|s| s.featured).sum();
    let tombstoned_total = scopes.iter().map(|s| s.tombstoned).sum();

    Ok(CatalogStats {
        directory_size,
        scopes,
        featured_total,
        tombstoned_total,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStats) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Scopes in directory: {}", stats.directory_size);
    println!("  Scopes with entities: {}", stats.scopes.len());
    println!("  Featured entities: {}", stats.featured_total);
    println!("  Tombstoned entities: {}", stats.tombstoned_total);
    println!();

    if !stats.scopes.is_empty() {
        println!("Entities by Scope:");
        // Largest scopes first
        let mut scopes: Vec<_> = stats.scopes.iter().collect();
        scopes.sort_by(|a, b| b.featured.cmp(&a.featured).then(a.scope.cmp(&b.scope)));

        for scope in scopes {
            println!(
                "  {}: {} featured, {} tombstoned",
                scope.scope, scope.featured, scope.tombstoned
            );
        }
        println!();
    }

    let total = stats.featured_total + stats.tombstoned_total;
    let featured_rate = if total > 0 {
        (stats.featured_total as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Featured Rate: {:.1}% ({} / {} entities)",
        featured_rate, stats.featured_total, total
    );
}

/// Prints review flags, newest first
pub fn print_review_flags(flags: &[ReviewFlag]) {
    if flags.is_empty() {
        println!("No scopes flagged for review");
        return;
    }

    println!("=== Scopes Flagged for Review ({}) ===\n", flags.len());
    for flag in flags {
        println!(
            "  {} [{}] batch {}: {}",
            flag.flagged_at.format("%Y-%m-%d %H:%M:%S"),
            flag.scope,
            flag.batch_id,
            flag.reason
        );
    }
}
