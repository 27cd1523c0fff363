//! Page driver abstraction
//!
//! A page driver is the session the extraction pipeline talks to: it loads a
//! page, waits for elements, reads items and clicks controls. The pipeline
//! never sees HTTP or selectors directly, only [`Locator`]s built from the
//! site profile.

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::{build_http_client, HttpDriverFactory, HttpPageDriver};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a page driver session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session disconnected: {0}")]
    Disconnected(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element {0} cannot be interacted with")]
    NotInteractive(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Driver error: {0}")]
    Other(String),
}

impl DriverError {
    /// Returns true when the session itself is broken and must be recreated
    pub fn is_session_related(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Returns true when repeating the same call may succeed
    ///
    /// A locator that is absent or malformed, or an element that cannot be
    /// clicked, will not change on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::NotFound(_) | Self::NotInteractive(_) | Self::InvalidSelector(_)
        )
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// A CSS selector, optionally scoped to the elements of another selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub scope: Option<String>,
    pub selector: String,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            scope: None,
            selector: selector.into(),
        }
    }

    /// Restricts matches to descendants of elements matching `scope`
    pub fn within(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{} >> {}", scope, self.selector),
            None => write!(f, "{}", self.selector),
        }
    }
}

/// One item read by [`PageDriver::collect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedItem {
    /// Trimmed visible text
    pub text: String,
    /// Identifier read from the configured attribute, if present
    pub id: Option<String>,
}

impl CollectedItem {
    pub fn new(text: impl Into<String>, id: Option<&str>) -> Self {
        Self {
            text: text.into(),
            id: id.map(str::to_string),
        }
    }
}

/// What [`PageDriver::wait_for`] found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    /// Text of the first matching element
    pub text: String,
    /// Number of matching elements
    pub matches: usize,
}

/// One browser-like session owned by a single worker
///
/// Methods take `&self`; implementations keep their page state behind
/// interior mutability so retries can re-borrow the driver freely.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `url`, replacing the current page
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Waits up to `timeout` for `locator` to match at least one element
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> DriverResult<ElementInfo>;

    /// Reads every element matching `locator` on the current page
    async fn collect(&self, locator: &Locator) -> DriverResult<Vec<CollectedItem>>;

    /// Activates the first element matching `locator`
    ///
    /// Returns `NotFound` when nothing matches and `NotInteractive` when the
    /// element exists but cannot be activated.
    async fn click(&self, locator: &Locator) -> DriverResult<()>;

    /// Releases the session
    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}

/// Opens page driver sessions for workers
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, worker_id: usize) -> DriverResult<Box<dyn PageDriver>>;
}
