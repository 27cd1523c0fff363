//! catalog-sync main entry point
//!
//! This is the command-line interface for the catalog-sync batch runner.

use anyhow::Context;
use catalog_sync::config::{load_config_with_hash, load_directory_file, Config};
use catalog_sync::crawler::{crawl, plan_batch, CrawlOptions};
use catalog_sync::output::{
    load_statistics, print_report, print_review_flags, print_statistics,
};
use catalog_sync::storage::{JobSource, ReviewLog, SqliteStorage};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// catalog-sync: crawl retail catalogs and reconcile them into a store
///
/// catalog-sync runs every scope of the job directory through a pool of
/// extraction sessions, retries transient failures, checkpoints progress so
/// long batches can resume, and tombstones entities that disappeared from
/// the site.
#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(version)]
#[command(about = "Crawl orchestration and reconciliation for retail catalogs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard the batch checkpoint and start from the first job
    #[arg(long, conflicts_with = "resume_from")]
    fresh: bool,

    /// Start from this job index instead of the checkpoint
    #[arg(long, value_name = "INDEX")]
    resume_from: Option<usize>,

    /// Validate config and show the batch that would run
    #[arg(long, conflicts_with_all = ["stats", "review", "import"])]
    dry_run: bool,

    /// Show catalog statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "review", "import"])]
    stats: bool,

    /// List scopes flagged for manual review and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "import"])]
    review: bool,

    /// Register the scopes of a directory file in the job directory and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "review"])]
    import: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(file) = &cli.import {
        handle_import(&config, file)?;
    } else if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.review {
        handle_review(&config)?;
    } else {
        return handle_crawl(config, config_hash, cli.fresh, cli.resume_from).await;
    }

    Ok(ExitCode::SUCCESS)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_sync=info,warn"),
            1 => EnvFilter::new("catalog_sync=debug,info"),
            2 => EnvFilter::new("catalog_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    SqliteStorage::new(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open database {}", config.storage.database_path))
}

/// Handles --import: registers directory scopes as jobs
fn handle_import(config: &Config, file: &Path) -> anyhow::Result<()> {
    let jobs = load_directory_file(file)
        .with_context(|| format!("Failed to load directory file {}", file.display()))?;
    let mut storage = open_storage(config)?;

    for job in &jobs {
        storage.register_job(job)?;
    }

    println!(
        "✓ Registered {} scopes from {} into {}",
        jobs.len(),
        file.display(),
        config.storage.database_path
    );
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows the batch
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== catalog-sync Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.concurrency);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms cap",
        config.crawler.base_delay_ms, config.crawler.max_delay_ms
    );
    println!(
        "  Session restart every: {} jobs",
        config.crawler.session_restart_every
    );
    println!(
        "  Operation timeout: {}ms",
        config.crawler.operation_timeout_ms
    );
    println!("  Page ceiling: {}", config.crawler.max_pages);
    if let Some(filter) = &config.crawler.scope_filter {
        println!("  Scope filter: {}", filter);
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSite Profile: {}", config.site.name);
    println!("  Page size: {}", config.site.page_size);
    println!("  Primary container: {}", config.site.primary_container);
    if let Some(fallback) = &config.site.fallback_container {
        println!("  Fallback container: {}", fallback);
    }
    println!("  Item: {} (id from {})", config.site.item, config.site.id_attribute);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Checkpoints: {}", config.storage.checkpoint_path);
    if let Some(summary) = &config.storage.summary_path {
        println!("  Summary: {}", summary);
    }

    let plan = plan_batch(config)?;

    println!("\nBatch {} ({} jobs):", plan.batch_id, plan.jobs.len());
    for (index, job) in plan.jobs.iter().enumerate() {
        let marker = if index < plan.resume_from { "done" } else { "todo" };
        match &job.parent_scope {
            Some(parent) => println!(
                "  [{}] {} {} (in {}) -> {}",
                index, marker, job.scope_id, parent, job.source_locator
            ),
            None => println!(
                "  [{}] {} {} -> {}",
                index, marker, job.scope_id, job.source_locator
            ),
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would run {} of {} jobs starting at index {}",
        plan.jobs.len().saturating_sub(plan.resume_from),
        plan.jobs.len(),
        plan.resume_from
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --review mode: lists scopes flagged for review
fn handle_review(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let flags = storage.list_review_flags()?;
    print_review_flags(&flags);

    Ok(())
}

/// Handles the main batch run
async fn handle_crawl(
    config: Config,
    config_hash: String,
    fresh: bool,
    resume_from: Option<usize>,
) -> anyhow::Result<ExitCode> {
    if fresh {
        tracing::info!("Starting fresh batch (ignoring checkpoint)");
    } else {
        tracing::info!("Starting batch (will resume from checkpoint if one exists)");
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight reconciliations");
            signal_token.cancel();
        }
    });

    let options = CrawlOptions {
        fresh,
        resume_from,
        cancel,
        config_hash: Some(config_hash),
    };

    let report = crawl(&config, options).await.context("Batch failed")?;
    print_report(&report);

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
