use serde::Deserialize;

/// Main configuration structure for catalog-sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub site: SiteProfile,
}

/// Worker pool, retry and session behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers (one page driver session each)
    pub concurrency: u32,

    /// Retries per operation after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff base delay (milliseconds)
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive completed jobs before a worker recreates its session
    #[serde(rename = "session-restart-every")]
    pub session_restart_every: u32,

    /// Timeout for each navigate/wait/collect/click call (milliseconds)
    #[serde(rename = "operation-timeout-ms", default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Safety ceiling on pages read per scope
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Only run jobs whose scope or parent scope matches
    #[serde(rename = "scope-filter", default)]
    pub scope_filter: Option<String>,
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_operation_timeout_ms() -> u64 {
    15_000
}

fn default_max_pages() -> u32 {
    50
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Where durable state lives
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite catalog database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory holding one checkpoint file per batch
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Optional markdown batch summary
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

/// Site-specific locators consumed by the page driver
///
/// The orchestration core treats every selector here as opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    /// Retailer name, used in logs and summaries
    pub name: String,

    /// Items a full page holds; a shorter page is the last one
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Container that holds the entity list on a healthy page
    #[serde(rename = "primary-container")]
    pub primary_container: String,

    /// Secondary container; extracting from it yields a degraded snapshot
    #[serde(rename = "fallback-container", default)]
    pub fallback_container: Option<String>,

    /// Entity items, relative to the container
    pub item: String,

    /// Attribute carrying the entity slug (`href` uses the last path segment)
    #[serde(rename = "id-attribute")]
    pub id_attribute: String,

    /// Controls clicked in order before locating the container
    #[serde(default)]
    pub expand: Vec<String>,

    /// Control that advances to the next page
    #[serde(rename = "next-page", default)]
    pub next_page: Option<String>,

    /// Element whose first number is the total entity count
    #[serde(rename = "total-count", default)]
    pub total_count: Option<String>,
}

/// A file of scopes to register in the job directory
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryFile {
    #[serde(rename = "scope", default)]
    pub scopes: Vec<DirectoryEntry>,
}

/// One scope entry of a directory file
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub url: String,
    #[serde(default)]
    pub ordinal: Option<u32>,
}
