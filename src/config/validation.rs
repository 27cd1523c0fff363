use crate::config::types::{
    Config, CrawlerConfig, DirectoryFile, SiteProfile, StorageConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_site_profile(&config.site)?;
    Ok(())
}

/// Validates worker pool, retry and session settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.base_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "base_delay_ms must be >= 1".to_string(),
        ));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if config.session_restart_every < 1 {
        return Err(ConfigError::Validation(
            "session_restart_every must be >= 1".to_string(),
        ));
    }

    if config.operation_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "operation_timeout_ms must be >= 100ms, got {}ms",
            config.operation_timeout_ms
        )));
    }

    if config.max_pages < 1 || config.max_pages > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and 1000, got {}",
            config.max_pages
        )));
    }

    if let Some(filter) = &config.scope_filter {
        if filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "scope_filter cannot be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.summary_path, Some(p) if p.is_empty()) {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site profile's locators
fn validate_site_profile(site: &SiteProfile) -> Result<(), ConfigError> {
    if site.name.is_empty() {
        return Err(ConfigError::Validation("site name cannot be empty".to_string()));
    }

    if site.page_size < 1 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    let required = [
        ("primary_container", site.primary_container.as_str()),
        ("item", site.item.as_str()),
        ("id_attribute", site.id_attribute.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} cannot be empty",
                field
            )));
        }
    }

    let optional = [
        ("fallback_container", site.fallback_container.as_deref()),
        ("next_page", site.next_page.as_deref()),
        ("total_count", site.total_count.as_deref()),
    ];
    for (field, value) in optional {
        if matches!(value, Some(v) if v.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "{} cannot be empty when set",
                field
            )));
        }
    }

    if site.expand.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "expand entries cannot be empty".to_string(),
        ));
    }

    let selectors = [
        Some(site.primary_container.as_str()),
        site.fallback_container.as_deref(),
        Some(site.item.as_str()),
        site.next_page.as_deref(),
        site.total_count.as_deref(),
    ];
    for selector in selectors
        .into_iter()
        .flatten()
        .chain(site.expand.iter().map(String::as_str))
    {
        Selector::parse(selector).map_err(|e| {
            ConfigError::Validation(format!("invalid selector '{}': {:?}", selector, e))
        })?;
    }

    if site.fallback_container.as_deref() == Some(site.primary_container.as_str()) {
        return Err(ConfigError::Validation(
            "fallback_container must differ from primary_container".to_string(),
        ));
    }

    Ok(())
}

/// Validates a directory file before its scopes are registered
pub fn validate_directory(file: &DirectoryFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &file.scopes {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "scope id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate scope id '{}'",
                entry.id
            )));
        }

        Url::parse(&entry.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid url for scope '{}': {}", entry.id, e))
        })?;
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
