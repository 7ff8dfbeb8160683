//! Configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety
//!
//! The loaded [`Config`] is passed explicitly into the pipeline entry
//! points rather than held in process-wide state, so tests can run against
//! temporary stores and arbitrary repository sets.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry API endpoint
    pub api: ApiConfig,

    /// Fetch and window-planning configuration
    pub fetch: FetchConfig,

    /// Persistent store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Repositories to ingest, as namespace/name paths
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Log entries requested per page
    pub page_size: u32,
    /// Tag entries requested per page of the tag listing
    pub tag_page_size: u32,
    /// First-run window length, in days
    pub lookback_days: i64,
    /// Backward overlap applied when resuming, in hours
    pub overlap_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            repositories: vec![
                "fedora/fedora-bootc".to_string(),
                "fedora/fedora-coreos".to_string(),
            ],
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://quay.io/api/v1".to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            tag_page_size: 100,
            lookback_days: 7,
            overlap_hours: 1,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("quay_usage.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("quay-usage.toml"),
            PathBuf::from(".quay-usage.toml"),
            dirs::config_dir()
                .map(|d| d.join("quay-usage").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // API overrides
        if let Ok(val) = env::var("QUAY_API_BASE_URL") {
            self.api.base_url = val;
        }

        // Fetch overrides
        if let Ok(val) = env::var("QUAY_USAGE_PAGE_SIZE") {
            self.fetch.page_size = val.parse().context("Invalid QUAY_USAGE_PAGE_SIZE")?;
        }
        if let Ok(val) = env::var("QUAY_USAGE_LOOKBACK_DAYS") {
            self.fetch.lookback_days = val.parse().context("Invalid QUAY_USAGE_LOOKBACK_DAYS")?;
        }
        if let Ok(val) = env::var("QUAY_USAGE_OVERLAP_HOURS") {
            self.fetch.overlap_hours = val.parse().context("Invalid QUAY_USAGE_OVERLAP_HOURS")?;
        }

        // Store override
        if let Ok(val) = env::var("QUAY_USAGE_DB") {
            self.store.db_path = PathBuf::from(val);
        }

        // Repository list override, comma-separated
        if let Ok(val) = env::var("QUAY_USAGE_REPOS") {
            self.repositories = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetch.page_size == 0 {
            return Err(anyhow::anyhow!("Page size must be greater than 0"));
        }
        if self.fetch.tag_page_size == 0 {
            return Err(anyhow::anyhow!("Tag page size must be greater than 0"));
        }
        if self.fetch.lookback_days <= 0 {
            return Err(anyhow::anyhow!("Lookback days must be greater than 0"));
        }
        if self.fetch.overlap_hours < 0 {
            return Err(anyhow::anyhow!("Overlap hours cannot be negative"));
        }
        if self.api.base_url.is_empty() {
            return Err(anyhow::anyhow!("API base URL cannot be empty"));
        }
        if self.repositories.iter().any(|r| r.trim().is_empty()) {
            return Err(anyhow::anyhow!("Repository names cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://quay.io/api/v1");
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.lookback_days, 7);
        assert_eq!(config.fetch.overlap_hours, 1);
        assert_eq!(config.repositories.len(), 2);
    }

    #[test]
    fn test_env_override() {
        env::set_var("QUAY_USAGE_REPOS", "acme/app, acme/base");
        env::set_var("QUAY_USAGE_LOOKBACK_DAYS", "30");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.repositories, vec!["acme/app", "acme/base"]);
        assert_eq!(config.fetch.lookback_days, 30);
        env::remove_var("QUAY_USAGE_REPOS");
        env::remove_var("QUAY_USAGE_LOOKBACK_DAYS");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.fetch.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetch.lookback_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_parse() {
        let config: Config = toml::from_str(
            r#"
            repositories = ["acme/app"]

            [fetch]
            lookback_days = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.repositories, vec!["acme/app"]);
        assert_eq!(config.fetch.lookback_days, 14);
        // Untouched sections keep their defaults.
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.api.base_url, "https://quay.io/api/v1");
    }
}
