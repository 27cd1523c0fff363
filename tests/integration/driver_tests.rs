//! HTTP page driver tests against a mock catalog site

use catalog_sync::config::{SiteProfile, UserAgentConfig};
use catalog_sync::crawler::{ExtractionPipeline, RetryPolicy};
use catalog_sync::driver::{
    build_http_client, DriverError, HttpPageDriver, Locator, PageDriver,
};
use catalog_sync::{Confidence, CrawlJob};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn driver() -> HttpPageDriver {
    let client = build_http_client(&user_agent(), Duration::from_secs(5)).unwrap();
    HttpPageDriver::new(client, "data-slug", Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(20))
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

const FIRST_PAGE: &str = r#"
    <span id="total">3 productos</span>
    <ul class="filters">
        <li class="item" data-slug="aguas">Aguas (12)</li>
        <li class="item" data-slug="gaseosas">Gaseosas (30)</li>
    </ul>
    <a id="next" href="/bebidas/2">Siguiente</a>
    <a id="back" class="disabled" href="/">Volver</a>
"#;

const SECOND_PAGE: &str = r#"
    <ul class="filters">
        <li class="item" data-slug="jugos">Jugos</li>
    </ul>
"#;

async fn catalog_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bebidas"))
        .respond_with(html(FIRST_PAGE))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bebidas/2"))
        .respond_with(html(SECOND_PAGE))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_navigate_and_collect() {
    let server = catalog_server().await;
    let driver = driver();

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();

    let items = driver
        .collect(&Locator::css("li.item").within("ul.filters"))
        .await
        .unwrap();

    let ids: Vec<_> = items.iter().map(|i| i.id.as_deref().unwrap()).collect();
    assert_eq!(ids, vec!["aguas", "gaseosas"]);
    assert_eq!(items[0].text, "Aguas (12)");

    let total = driver.collect(&Locator::css("#total")).await.unwrap();
    assert_eq!(total[0].text, "3 productos");
}

#[tokio::test]
async fn test_click_follows_next_page() {
    let server = catalog_server().await;
    let driver = driver();

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();
    driver.click(&Locator::css("#next")).await.unwrap();

    assert_eq!(
        driver.current_url(),
        Some(format!("{}/bebidas/2", server.uri()))
    );

    let items = driver.collect(&Locator::css("li.item")).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_deref(), Some("jugos"));
}

#[tokio::test]
async fn test_click_on_disabled_control_is_not_interactive() {
    let server = catalog_server().await;
    let driver = driver();

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();

    let result = driver.click(&Locator::css("#back")).await;
    assert!(matches!(result, Err(DriverError::NotInteractive(_))));

    let result = driver.click(&Locator::css("#missing")).await;
    assert!(matches!(result, Err(DriverError::NotFound(_))));
}

#[tokio::test]
async fn test_missing_page_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = driver()
        .navigate(&format!("{}/discontinued", server.uri()))
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, DriverError::NotFound(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient_navigation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = driver()
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap_err();

    match &err {
        DriverError::Navigation { reason, .. } => assert_eq!(reason, "HTTP 503"),
        other => panic!("expected navigation error, got {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_wait_for_times_out_on_absent_element() {
    let server = catalog_server().await;
    let driver = driver();

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();

    let found = driver
        .wait_for(&Locator::css("ul.filters"), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(found.matches, 1);

    let result = driver
        .wait_for(&Locator::css("div.fallback"), Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(DriverError::NotFound(_))));
}

#[tokio::test]
async fn test_requests_carry_user_agent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bebidas"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html(SECOND_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    driver()
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_closed_session_has_no_page() {
    let server = catalog_server().await;
    let driver = driver();

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();
    driver.close().await.unwrap();

    assert_eq!(driver.current_url(), None);
    let result = driver.collect(&Locator::css("li.item")).await;
    assert!(matches!(result, Err(DriverError::Other(_))));
}

const LEGACY_PAGE: &str = r#"
    <ul class="legacy">
        <li class="item" data-slug="aguas">Aguas</li>
        <li class="item" data-slug="jugos">Jugos</li>
    </ul>
"#;

/// Serves `LEGACY_PAGE` at `/bebidas`, each response taking `latency`
async fn slow_legacy_server(latency: Duration) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bebidas"))
        .respond_with(html(LEGACY_PAGE).set_delay(latency))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_wait_for_gives_up_at_deadline_despite_slow_reloads() {
    let server = slow_legacy_server(Duration::from_millis(300)).await;
    let client = build_http_client(&user_agent(), Duration::from_secs(5)).unwrap();
    let driver = HttpPageDriver::new(client, "data-slug", Duration::from_secs(5));

    driver
        .navigate(&format!("{}/bebidas", server.uri()))
        .await
        .unwrap();

    let started = Instant::now();
    let result = driver
        .wait_for(&Locator::css("ul.filters"), Duration::from_millis(1000))
        .await;

    assert!(matches!(result, Err(DriverError::NotFound(_))));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn test_slow_fallback_page_is_degraded_not_timed_out() {
    let server = slow_legacy_server(Duration::from_millis(300)).await;
    let client = build_http_client(&user_agent(), Duration::from_secs(5)).unwrap();
    let driver = HttpPageDriver::new(client, "data-slug", Duration::from_secs(5));

    let profile = SiteProfile {
        name: "slow".to_string(),
        page_size: 10,
        primary_container: "ul.filters".to_string(),
        fallback_container: Some("ul.legacy".to_string()),
        item: "li.item".to_string(),
        id_attribute: "data-slug".to_string(),
        expand: vec![],
        next_page: None,
        total_count: None,
    };
    let pipeline = ExtractionPipeline::new(
        profile,
        RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1)),
        Duration::from_millis(1000),
        10,
    );
    let job = CrawlJob::new("bebidas", format!("{}/bebidas", server.uri()));

    for _ in 0..3 {
        let snapshot = pipeline.run(&driver, &job).await.unwrap();

        assert_eq!(snapshot.confidence, Confidence::Degraded);
        let slugs: Vec<_> = snapshot.entities.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["aguas", "jugos"]);
    }
}
