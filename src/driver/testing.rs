//! Scripted in-memory page driver for unit tests
//!
//! Pages are keyed by URL and respond to the fixed locators used by
//! [`test_profile`]: `#primary`, `#fallback`, `#item`, `#next`, `#total`,
//! `#expand` and the never-clickable `#locked`.

use crate::config::SiteProfile;
use crate::driver::{
    CollectedItem, DriverError, DriverFactory, DriverResult, ElementInfo, Locator, PageDriver,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Site profile whose locators the scripted driver understands
pub(crate) fn test_profile(page_size: u32) -> SiteProfile {
    SiteProfile {
        name: "scripted".to_string(),
        page_size,
        primary_container: "#primary".to_string(),
        fallback_container: Some("#fallback".to_string()),
        item: "#item".to_string(),
        id_attribute: "data-slug".to_string(),
        expand: vec![],
        next_page: Some("#next".to_string()),
        total_count: Some("#total".to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextControl {
    Absent,
    Clickable,
    Disabled,
}

/// One page of a scripted scope
#[derive(Debug, Clone)]
pub(crate) struct ScriptedPage {
    primary: bool,
    fallback: bool,
    items: Vec<CollectedItem>,
    next: NextControl,
    total: Option<String>,
}

impl ScriptedPage {
    fn with_items(items: &[(&str, &str)]) -> Self {
        Self {
            primary: false,
            fallback: false,
            items: items
                .iter()
                .map(|(text, slug)| CollectedItem::new(*text, Some(slug)))
                .collect(),
            next: NextControl::Absent,
            total: None,
        }
    }

    /// Items rendered inside the primary container
    pub fn primary(items: &[(&str, &str)]) -> Self {
        Self {
            primary: true,
            ..Self::with_items(items)
        }
    }

    /// Items rendered only inside the fallback container
    pub fn fallback(items: &[(&str, &str)]) -> Self {
        Self {
            fallback: true,
            ..Self::with_items(items)
        }
    }

    /// A page with neither container
    pub fn broken() -> Self {
        Self::with_items(&[])
    }

    pub fn next(mut self, next: NextControl) -> Self {
        self.next = next;
        self
    }

    pub fn total(mut self, text: &str) -> Self {
        self.total = Some(text.to_string());
        self
    }

    pub fn item_without_id(mut self, text: &str) -> Self {
        self.items.push(CollectedItem::new(text, None));
        self
    }
}

#[derive(Default)]
struct SiteState {
    scopes: HashMap<String, Vec<ScriptedPage>>,
    navigate_failures: HashMap<String, (usize, DriverError)>,
    hanging: HashSet<String>,
    navigations: Vec<String>,
    sessions_opened: usize,
    sessions_closed: usize,
    clicks: Vec<String>,
}

/// Shared script for every session a [`ScriptedFactory`] opens
#[derive(Clone, Default)]
pub(crate) struct ScriptedSite {
    state: Arc<Mutex<SiteState>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, url: &str, pages: Vec<ScriptedPage>) -> &Self {
        self.state
            .lock()
            .unwrap()
            .scopes
            .insert(url.to_string(), pages);
        self
    }

    /// The next `times` navigations to `url` fail with `error`
    pub fn fail_navigation(&self, url: &str, times: usize, error: DriverError) -> &Self {
        self.state
            .lock()
            .unwrap()
            .navigate_failures
            .insert(url.to_string(), (times, error));
        self
    }

    /// Navigations to `url` never complete
    pub fn hang_on(&self, url: &str) -> &Self {
        self.state.lock().unwrap().hanging.insert(url.to_string());
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        self.navigations().iter().filter(|n| *n == url).count()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.lock().unwrap().sessions_closed
    }

    pub fn driver(&self) -> ScriptedDriver {
        ScriptedDriver {
            site: self.clone(),
            current: Mutex::new(None),
        }
    }

    fn page(&self, url: &str, index: usize) -> DriverResult<ScriptedPage> {
        self.state
            .lock()
            .unwrap()
            .scopes
            .get(url)
            .and_then(|pages| pages.get(index))
            .cloned()
            .ok_or_else(|| DriverError::NotFound(format!("{} page {}", url, index)))
    }
}

/// A session over a [`ScriptedSite`]
pub(crate) struct ScriptedDriver {
    site: ScriptedSite,
    current: Mutex<Option<(String, usize)>>,
}

impl ScriptedDriver {
    fn current_page(&self) -> DriverResult<(String, usize, ScriptedPage)> {
        let current = self.current.lock().unwrap().clone();
        let (url, index) = current.ok_or_else(|| DriverError::Other("no page loaded".into()))?;
        let page = self.site.page(&url, index)?;
        Ok((url, index, page))
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let hang = {
            let mut state = self.site.state.lock().unwrap();
            state.navigations.push(url.to_string());

            if let Some((remaining, error)) = state.navigate_failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }

            if !state.scopes.contains_key(url) && !state.hanging.contains(url) {
                return Err(DriverError::NotFound(url.to_string()));
            }

            state.hanging.contains(url)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        *self.current.lock().unwrap() = Some((url.to_string(), 0));
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, _timeout: Duration) -> DriverResult<ElementInfo> {
        let (_, _, page) = self.current_page()?;

        let present = match locator.selector.as_str() {
            "#primary" => page.primary,
            "#fallback" => page.fallback,
            "#item" => (page.primary || page.fallback) && !page.items.is_empty(),
            "#next" => page.next != NextControl::Absent,
            "#total" => page.total.is_some(),
            _ => false,
        };

        if present {
            Ok(ElementInfo {
                text: String::new(),
                matches: 1,
            })
        } else {
            Err(DriverError::NotFound(locator.to_string()))
        }
    }

    async fn collect(&self, locator: &Locator) -> DriverResult<Vec<CollectedItem>> {
        let (_, _, page) = self.current_page()?;

        let items = match (locator.selector.as_str(), locator.scope.as_deref()) {
            ("#item", Some("#primary")) if page.primary => page.items,
            ("#item", Some("#fallback")) if page.fallback => page.items,
            ("#total", None) => page
                .total
                .map(|text| vec![CollectedItem::new(text, None)])
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Ok(items)
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let (url, index, page) = self.current_page()?;
        self.site
            .state
            .lock()
            .unwrap()
            .clicks
            .push(locator.selector.clone());

        match locator.selector.as_str() {
            "#next" => match page.next {
                NextControl::Absent => Err(DriverError::NotFound(locator.to_string())),
                NextControl::Disabled => Err(DriverError::NotInteractive(locator.to_string())),
                NextControl::Clickable => {
                    *self.current.lock().unwrap() = Some((url, index + 1));
                    Ok(())
                }
            },
            "#expand" => Ok(()),
            "#locked" => Err(DriverError::NotInteractive(locator.to_string())),
            _ => Err(DriverError::NotFound(locator.to_string())),
        }
    }

    async fn close(&self) -> DriverResult<()> {
        self.site.state.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}

/// Opens [`ScriptedDriver`] sessions and counts them
pub(crate) struct ScriptedFactory {
    site: ScriptedSite,
}

impl ScriptedFactory {
    pub fn new(site: &ScriptedSite) -> Self {
        Self { site: site.clone() }
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn open(&self, _worker_id: usize) -> DriverResult<Box<dyn PageDriver>> {
        self.site.state.lock().unwrap().sessions_opened += 1;
        Ok(Box::new(self.site.driver()))
    }
}
