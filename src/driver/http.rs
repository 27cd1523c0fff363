//! HTTP page driver
//!
//! This module drives catalog pages over plain HTTP:
//! - Building HTTP clients with the crawler user agent
//! - GET requests for navigation, with error classification
//! - HTML parsing and element selection with `scraper`
//! - Following `href` targets for clicks

use crate::config::{SiteProfile, UserAgentConfig};
use crate::driver::{
    CollectedItem, DriverError, DriverFactory, DriverResult, ElementInfo, Locator, PageDriver,
};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// The page a session currently has loaded
#[derive(Debug, Clone)]
struct LoadedPage {
    url: Url,
    body: String,
}

/// Page driver backed by a `reqwest` client
pub struct HttpPageDriver {
    client: Client,
    id_attribute: String,
    request_timeout: Duration,
    poll_interval: Duration,
    page: Mutex<Option<LoadedPage>>,
}

impl HttpPageDriver {
    pub fn new(client: Client, id_attribute: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            id_attribute: id_attribute.into(),
            request_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            page: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// URL of the page currently loaded, if any
    pub fn current_url(&self) -> Option<String> {
        self.page
            .lock()
            .ok()
            .and_then(|page| page.as_ref().map(|p| p.url.to_string()))
    }

    fn loaded(&self) -> DriverResult<LoadedPage> {
        let page = self
            .page
            .lock()
            .map_err(|_| DriverError::Other("page state lock poisoned".to_string()))?;
        (*page)
            .clone()
            .ok_or_else(|| DriverError::Other("no page loaded".to_string()))
    }

    fn store(&self, loaded: LoadedPage) -> DriverResult<()> {
        let mut page = self
            .page
            .lock()
            .map_err(|_| DriverError::Other("page state lock poisoned".to_string()))?;
        *page = Some(loaded);
        Ok(())
    }

    async fn load(&self, url: Url) -> DriverResult<()> {
        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DriverError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| self.classify(&url, e))?;

        self.store(LoadedPage {
            url: final_url,
            body,
        })
    }

    fn classify(&self, url: &Url, error: reqwest::Error) -> DriverError {
        if error.is_timeout() {
            DriverError::Timeout(self.request_timeout)
        } else if error.is_connect() {
            DriverError::Disconnected(format!("{}: {}", url, error))
        } else {
            DriverError::Navigation {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let parsed = Url::parse(url).map_err(|e| DriverError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.load(parsed).await
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> DriverResult<ElementInfo> {
        let deadline = Instant::now() + timeout;

        loop {
            let page = self.loaded()?;
            if let Some(info) = inspect(&page.body, locator)? {
                return Ok(info);
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(DriverError::NotFound(locator.to_string()));
            }

            tokio::time::sleep(self.poll_interval).await;

            // A reload still in flight at the deadline counts as not found
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.load(page.url)).await {
                Ok(reloaded) => reloaded?,
                Err(_) => return Err(DriverError::NotFound(locator.to_string())),
            }
        }
    }

    async fn collect(&self, locator: &Locator) -> DriverResult<Vec<CollectedItem>> {
        let page = self.loaded()?;
        collect_items(&page.body, locator, &self.id_attribute)
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let page = self.loaded()?;
        let href = click_target(&page.body, locator)?;

        let target = page.url.join(&href).map_err(|e| DriverError::Navigation {
            url: href.clone(),
            reason: e.to_string(),
        })?;

        self.load(target).await
    }

    async fn close(&self) -> DriverResult<()> {
        let mut page = self
            .page
            .lock()
            .map_err(|_| DriverError::Other("page state lock poisoned".to_string()))?;
        *page = None;
        Ok(())
    }
}

/// Opens one HTTP client per session, identified by the crawler user agent
pub struct HttpDriverFactory {
    user_agent: UserAgentConfig,
    id_attribute: String,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl HttpDriverFactory {
    pub fn new(user_agent: &UserAgentConfig, site: &SiteProfile, request_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.clone(),
            id_attribute: site.id_attribute.clone(),
            request_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn open(&self, worker_id: usize) -> DriverResult<Box<dyn PageDriver>> {
        let client = build_http_client(&self.user_agent, self.request_timeout)
            .map_err(|e| DriverError::Other(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!("Worker {} opened HTTP session", worker_id);

        Ok(Box::new(
            HttpPageDriver::new(client, self.id_attribute.clone(), self.request_timeout)
                .with_poll_interval(self.poll_interval),
        ))
    }
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| DriverError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Selects every element matching `locator`, in document order
fn select<'a>(document: &'a Html, locator: &Locator) -> DriverResult<Vec<ElementRef<'a>>> {
    let selector = parse_selector(&locator.selector)?;

    match &locator.scope {
        Some(scope) => {
            let scope_selector = parse_selector(scope)?;
            Ok(document
                .select(&scope_selector)
                .flat_map(|container| container.select(&selector))
                .collect())
        }
        None => Ok(document.select(&selector).collect()),
    }
}

/// Whitespace-normalized text of an element
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn inspect(body: &str, locator: &Locator) -> DriverResult<Option<ElementInfo>> {
    let document = Html::parse_document(body);
    let elements = select(&document, locator)?;

    Ok(elements.first().map(|first| ElementInfo {
        text: element_text(first),
        matches: elements.len(),
    }))
}

fn collect_items(
    body: &str,
    locator: &Locator,
    id_attribute: &str,
) -> DriverResult<Vec<CollectedItem>> {
    let document = Html::parse_document(body);
    let elements = select(&document, locator)?;

    Ok(elements
        .iter()
        .map(|element| {
            let id = element.value().attr(id_attribute).and_then(|raw| {
                if id_attribute == "href" {
                    last_path_segment(raw)
                } else {
                    Some(raw.trim().to_string()).filter(|s| !s.is_empty())
                }
            });

            CollectedItem {
                text: element_text(element),
                id,
            }
        })
        .collect())
}

/// Returns the `href` a click on `locator` would follow
fn click_target(body: &str, locator: &Locator) -> DriverResult<String> {
    let document = Html::parse_document(body);
    let elements = select(&document, locator)?;

    let element = elements
        .first()
        .ok_or_else(|| DriverError::NotFound(locator.to_string()))?;

    let value = element.value();
    let disabled = value.attr("disabled").is_some()
        || value.attr("aria-disabled") == Some("true")
        || value.classes().any(|c| c == "disabled");

    match value.attr("href") {
        Some(href) if !disabled && !href.trim().is_empty() && !href.starts_with('#') => {
            Ok(href.trim().to_string())
        }
        _ => Err(DriverError::NotInteractive(locator.to_string())),
    }
}

/// `/almacen/bebidas/?page=2` becomes `bebidas`
fn last_path_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or("");
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
