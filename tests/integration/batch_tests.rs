//! End-to-end batch tests: directory import, crawl, reconcile, checkpoint

use catalog_sync::checkpoint::{batch_id_for, CheckpointStore, FileCheckpointStore};
use catalog_sync::config::{Config, CrawlerConfig, SiteProfile, StorageConfig, UserAgentConfig};
use catalog_sync::crawler::{crawl, load_jobs, plan_batch, CrawlOptions};
use catalog_sync::output::FailureKind;
use catalog_sync::storage::{EntityFilter, EntityStore, JobSource, ReviewLog, SqliteStorage};
use catalog_sync::CrawlJob;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted in `dir`
fn create_test_config(dir: &TempDir) -> Config {
    Config {
        crawler: CrawlerConfig {
            concurrency: 1,
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 5,
            session_restart_every: 3,
            operation_timeout_ms: 200,
            max_pages: 10,
            scope_filter: None,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: dir.path().join("catalog.db").display().to_string(),
            checkpoint_path: dir.path().join("checkpoints").display().to_string(),
            summary_path: Some(dir.path().join("summary.md").display().to_string()),
        },
        site: SiteProfile {
            name: "Mock Market".to_string(),
            page_size: 2,
            primary_container: "ul.filters".to_string(),
            fallback_container: Some("ul.legacy".to_string()),
            item: "li.item".to_string(),
            id_attribute: "data-slug".to_string(),
            expand: vec![],
            next_page: Some("a.next".to_string()),
            total_count: None,
        },
    }
}

fn open(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.storage.database_path)).unwrap()
}

/// Registers `bebidas` (ordinal 0) and `lacteos` (ordinal 1) under `almacen`
fn register_scopes(config: &Config, base: &str) -> Vec<CrawlJob> {
    let jobs = vec![
        CrawlJob::new("bebidas", format!("{}/almacen/bebidas", base))
            .with_parent("almacen")
            .with_ordinal(0),
        CrawlJob::new("lacteos", format!("{}/almacen/lacteos", base))
            .with_parent("almacen")
            .with_ordinal(1),
    ];

    let mut storage = open(config);
    for job in &jobs {
        storage.register_job(job).unwrap();
    }
    jobs
}

fn filter_page(container: &str, items: &[(&str, &str)], next: Option<&str>) -> ResponseTemplate {
    let items: String = items
        .iter()
        .map(|(name, slug)| format!(r#"<li class="item" data-slug="{}">{}</li>"#, slug, name))
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{}">Siguiente</a>"#, href))
        .unwrap_or_default();

    ResponseTemplate::new(200)
        .set_body_string(format!(
            r#"<html><body><ul class="{}">{}</ul>{}</body></html>"#,
            container, items, next
        ))
        .insert_header("content-type", "text/html")
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Bebidas spans two pages; lacteos fits on one
async fn mount_catalog(server: &MockServer) {
    mount_bebidas(server).await;
    mount(
        server,
        "/almacen/lacteos",
        filter_page("filters", &[("Leches (8)", "leches")], None),
    )
    .await;
}

async fn mount_bebidas(server: &MockServer) {
    mount(
        server,
        "/almacen/bebidas",
        filter_page(
            "filters",
            &[("Aguas (12)", "aguas"), ("Gaseosas (30)", "gaseosas")],
            Some("/almacen/bebidas/2"),
        ),
    )
    .await;
    mount(
        server,
        "/almacen/bebidas/2",
        filter_page("filters", &[("Jugos", "jugos")], None),
    )
    .await;
}

/// Every persisted record, minus timestamps, in scope then slug order
fn catalog_state(config: &Config) -> Vec<(String, String, bool, bool, String, Option<u32>, u32)> {
    open(config)
        .find(&EntityFilter::default())
        .unwrap()
        .into_iter()
        .map(|r| {
            (
                r.scope,
                r.slug,
                r.featured,
                r.active,
                r.metadata.name,
                r.metadata.count_hint,
                r.metadata.priority,
            )
        })
        .collect()
}

fn featured_slugs(storage: &SqliteStorage, scope: &str, featured: bool) -> Vec<String> {
    storage
        .find(&EntityFilter::in_scope(scope).featured(featured))
        .unwrap()
        .into_iter()
        .map(|record| record.slug)
        .collect()
}

#[tokio::test]
async fn test_full_batch_reconciles_and_clears_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let jobs = register_scopes(&config, &server.uri());

    let options = CrawlOptions {
        config_hash: Some("abc123".to_string()),
        ..CrawlOptions::default()
    };
    let report = crawl(&config, options).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.added_total, 4);
    assert_eq!(report.removed_total, 0);
    assert_eq!(report.succeeded[0].pages, 2);
    assert_eq!(report.config_hash.as_deref(), Some("abc123"));

    let storage = open(&config);
    assert_eq!(
        featured_slugs(&storage, "bebidas", true),
        vec!["aguas", "gaseosas", "jugos"]
    );
    assert_eq!(featured_slugs(&storage, "lacteos", true), vec!["leches"]);

    let leches = storage
        .find(&EntityFilter::in_scope("lacteos"))
        .unwrap()
        .remove(0);
    assert_eq!(leches.metadata.name, "Leches");
    assert_eq!(leches.metadata.count_hint, Some(8));
    assert_eq!(leches.metadata.parent_scope.as_deref(), Some("almacen"));

    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_path).unwrap();
    assert!(checkpoints.load(&batch_id_for(&jobs)).unwrap().is_none());

    let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(summary.contains("# Mock Market Catalog Sync Summary"));
    assert!(summary.contains("abc123"));
}

#[tokio::test]
async fn test_second_run_tombstones_missing_entities() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    register_scopes(&config, &server.uri());

    crawl(&config, CrawlOptions::default()).await.unwrap();

    // Gaseosas and jugos were discontinued
    server.reset().await;
    mount(
        &server,
        "/almacen/bebidas",
        filter_page("filters", &[("Aguas (14)", "aguas")], None),
    )
    .await;
    mount(
        &server,
        "/almacen/lacteos",
        filter_page("filters", &[("Leches (8)", "leches")], None),
    )
    .await;

    let report = crawl(&config, CrawlOptions::default()).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.added_total, 0);
    assert_eq!(report.updated_total, 2);
    assert_eq!(report.removed_total, 2);

    let storage = open(&config);
    assert_eq!(featured_slugs(&storage, "bebidas", true), vec!["aguas"]);
    assert_eq!(
        featured_slugs(&storage, "bebidas", false),
        vec!["gaseosas", "jugos"]
    );

    let aguas = storage
        .find(&EntityFilter::in_scope("bebidas").slugs(vec!["aguas".to_string()]))
        .unwrap()
        .remove(0);
    assert_eq!(aguas.metadata.count_hint, Some(14));
}

#[tokio::test]
async fn test_degraded_scope_is_flagged_not_tombstoned() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    register_scopes(&config, &server.uri());

    crawl(&config, CrawlOptions::default()).await.unwrap();

    // The primary container vanished; only the legacy list remains
    server.reset().await;
    mount(
        &server,
        "/almacen/bebidas",
        filter_page("legacy", &[("Aguas (12)", "aguas")], None),
    )
    .await;
    mount(
        &server,
        "/almacen/lacteos",
        filter_page("filters", &[("Leches (8)", "leches")], None),
    )
    .await;

    let report = crawl(&config, CrawlOptions::default()).await.unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.removed_total, 0);
    assert_eq!(report.review.len(), 1);
    assert_eq!(report.review[0].scope, "bebidas");

    let storage = open(&config);
    assert_eq!(
        featured_slugs(&storage, "bebidas", true),
        vec!["aguas", "gaseosas", "jugos"]
    );

    let flags = storage.list_review_flags().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].scope, "bebidas");
    assert_eq!(flags[0].batch_id, report.batch_id);
}

#[tokio::test]
async fn test_failed_scope_holds_checkpoint_and_resumes() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    register_scopes(&config, &server.uri());

    // Lacteos is not served yet and answers 404
    mount(
        &server,
        "/almacen/bebidas",
        filter_page("filters", &[("Aguas", "aguas")], None),
    )
    .await;

    let first = crawl(&config, CrawlOptions::default()).await.unwrap();

    assert!(!first.is_clean());
    assert_eq!(first.succeeded.len(), 1);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].scope, "lacteos");
    assert_eq!(first.failed[0].kind, FailureKind::Structural);

    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_path).unwrap();
    let saved = checkpoints.load(&first.batch_id).unwrap().unwrap();
    assert_eq!(saved.resume_index(), 1);

    mount(
        &server,
        "/almacen/lacteos",
        filter_page("filters", &[("Leches", "leches")], None),
    )
    .await;

    let second = crawl(&config, CrawlOptions::default()).await.unwrap();

    assert!(second.is_clean());
    assert_eq!(second.batch_id, first.batch_id);
    assert_eq!(second.resumed_from, 1);
    assert_eq!(second.succeeded.len(), 1);
    assert_eq!(second.succeeded[0].scope, "lacteos");
    assert!(checkpoints.load(&first.batch_id).unwrap().is_none());
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    let jobs = register_scopes(&config, &server.uri());

    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_path).unwrap();
    checkpoints
        .save(&batch_id_for(&jobs), 0, Default::default())
        .unwrap();
    assert_eq!(plan_batch(&config).unwrap().resume_from, 1);

    mount_catalog(&server).await;
    let options = CrawlOptions {
        fresh: true,
        ..CrawlOptions::default()
    };
    let report = crawl(&config, options).await.unwrap();

    assert_eq!(report.resumed_from, 0);
    assert_eq!(report.succeeded.len(), 2);
}

#[tokio::test]
async fn test_cancelled_batch_is_interrupted() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    register_scopes(&config, &server.uri());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = crawl(
        &config,
        CrawlOptions {
            cancel,
            ..CrawlOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(report.interrupted);
    assert!(!report.is_clean());
    assert!(report.succeeded.is_empty());
    assert_eq!(report.unprocessed(), 2);
}

#[tokio::test]
async fn test_scope_filter_selects_subtree() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);

    let mut storage = open(&config);
    for job in [
        CrawlJob::new("almacen", "https://example.com/almacen").with_ordinal(0),
        CrawlJob::new("bebidas", "https://example.com/almacen/bebidas")
            .with_parent("almacen")
            .with_ordinal(1),
        CrawlJob::new("limpieza", "https://example.com/limpieza").with_ordinal(2),
    ] {
        storage.register_job(&job).unwrap();
    }

    config.crawler.scope_filter = Some("almacen".to_string());
    let selected: Vec<_> = load_jobs(&storage, &config.crawler)
        .unwrap()
        .into_iter()
        .map(|job| job.scope_id)
        .collect();
    assert_eq!(selected, vec!["almacen", "bebidas"]);

    let plan = plan_batch(&config).unwrap();
    assert_eq!(plan.jobs.len(), 2);
    assert_eq!(plan.resume_from, 0);
}

#[tokio::test]
async fn test_resumed_batch_matches_uninterrupted_run() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let reference_dir = TempDir::new().unwrap();
    let reference = create_test_config(&reference_dir);
    register_scopes(&reference, &server.uri());
    assert!(crawl(&reference, CrawlOptions::default())
        .await
        .unwrap()
        .is_clean());

    // Lacteos hangs so the batch can be stopped right after bebidas commits
    let slow = MockServer::start().await;
    mount_bebidas(&slow).await;
    mount(
        &slow,
        "/almacen/lacteos",
        filter_page("filters", &[("Leches (8)", "leches")], None)
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.operation_timeout_ms = 10_000;
    let jobs = register_scopes(&config, &slow.uri());

    let cancel = CancellationToken::new();
    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_path).unwrap();
    let watcher = {
        let cancel = cancel.clone();
        let batch_id = batch_id_for(&jobs);
        tokio::spawn(async move {
            while checkpoints.load(&batch_id).ok().flatten().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            cancel.cancel();
        })
    };

    let interrupted = crawl(
        &config,
        CrawlOptions {
            cancel,
            ..CrawlOptions::default()
        },
    )
    .await
    .unwrap();
    watcher.await.unwrap();

    assert!(interrupted.interrupted);
    assert_eq!(interrupted.succeeded.len(), 1);
    assert_eq!(interrupted.unprocessed(), 1);

    slow.reset().await;
    mount_catalog(&slow).await;

    let resumed = crawl(&config, CrawlOptions::default()).await.unwrap();

    assert!(resumed.is_clean());
    assert_eq!(resumed.resumed_from, 1);
    assert_eq!(catalog_state(&config), catalog_state(&reference));
}
