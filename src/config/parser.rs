use crate::config::types::{Config, DirectoryFile};
use crate::config::validation::{validate, validate_directory};
use crate::model::CrawlJob;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded in batch summaries so a run can be traced back to the exact
/// configuration that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads a directory file into crawl jobs
///
/// Entries without an explicit ordinal get their position in the file.
///
/// ```toml
/// [[scope]]
/// id = "bebidas"
/// parent = "almacen"
/// url = "https://example.com/almacen/bebidas"
/// ```
pub fn load_directory_file(path: &Path) -> Result<Vec<CrawlJob>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let file: DirectoryFile = toml::from_str(&content)?;
    validate_directory(&file)?;

    let jobs = file
        .scopes
        .into_iter()
        .enumerate()
        .map(|(position, entry)| CrawlJob {
            scope_id: entry.id,
            parent_scope: entry.parent,
            source_locator: entry.url,
            ordinal: entry.ordinal.unwrap_or(position as u32),
        })
        .collect();

    Ok(jobs)
}
