//! Configuration management with file persistence
//!
//! Cache lifetimes and retention ceilings are fixed for the lifetime of a
//! process. The config file only lets a deployment pick different fixed values.

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Component spec cache lifetime (7 days)
pub const DEFAULT_COMPONENT_TTL_HOURS: u64 = 7 * 24;

/// Datasheet cache lifetime (30 days)
pub const DEFAULT_DATASHEET_TTL_HOURS: u64 = 30 * 24;

/// Maximum number of scans kept in history
pub const DEFAULT_SCAN_HISTORY_LIMIT: u32 = 100;

/// Maximum results returned by cache searches
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Default page size for history listings
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default time to wait on a locked database
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Specscan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to `<config dir>/specscan.db`
    pub database_path: Option<PathBuf>,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub component_ttl_hours: u64,
    pub datasheet_ttl_hours: u64,
    pub search_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention_limit: u32,
    pub page_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            component_ttl_hours: DEFAULT_COMPONENT_TTL_HOURS,
            datasheet_ttl_hours: DEFAULT_DATASHEET_TTL_HOURS,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_limit: DEFAULT_SCAN_HISTORY_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn component_ttl(&self) -> chrono::Duration {
        hours(self.component_ttl_hours)
    }

    pub fn datasheet_ttl(&self) -> chrono::Duration {
        hours(self.datasheet_ttl_hours)
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    /// Resolve the database path, falling back to the config directory
    pub fn resolved_database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join("specscan.db")),
        }
    }
}

/// TTLs are capped at a century so expiry timestamps stay representable
const MAX_TTL_HOURS: u64 = 100 * 365 * 24;

fn hours(h: u64) -> chrono::Duration {
    chrono::Duration::hours(h.min(MAX_TTL_HOURS) as i64)
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SPECSCAN_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("specscan")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.component_ttl_hours == 0 {
            bail!("cache.component_ttl_hours must be greater than zero");
        }
        if self.cache.datasheet_ttl_hours == 0 {
            bail!("cache.datasheet_ttl_hours must be greater than zero");
        }
        if self.cache.search_limit == 0 {
            bail!("cache.search_limit must be greater than zero");
        }
        if self.history.retention_limit == 0 {
            bail!("history.retention_limit must be greater than zero");
        }
        if self.history.page_size == 0 {
            bail!("history.page_size must be greater than zero");
        }
        Ok(())
    }

    /// All dotted keys understood by `get` and `set`
    pub fn keys() -> &'static [&'static str] {
        &[
            "storage.database_path",
            "storage.busy_timeout_secs",
            "cache.component_ttl_hours",
            "cache.datasheet_ttl_hours",
            "cache.search_limit",
            "history.retention_limit",
            "history.page_size",
        ]
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "storage.database_path" => Ok(self
                .storage
                .database_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "storage.busy_timeout_secs" => Ok(self.storage.busy_timeout_secs.to_string()),
            "cache.component_ttl_hours" => Ok(self.cache.component_ttl_hours.to_string()),
            "cache.datasheet_ttl_hours" => Ok(self.cache.datasheet_ttl_hours.to_string()),
            "cache.search_limit" => Ok(self.cache.search_limit.to_string()),
            "history.retention_limit" => Ok(self.history.retention_limit.to_string()),
            "history.page_size" => Ok(self.history.page_size.to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `specscan config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.database_path" => {
                self.storage.database_path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "storage.busy_timeout_secs" => {
                self.storage.busy_timeout_secs = parse_number(key, value)?;
            }
            "cache.component_ttl_hours" => {
                self.cache.component_ttl_hours = parse_number(key, value)?;
            }
            "cache.datasheet_ttl_hours" => {
                self.cache.datasheet_ttl_hours = parse_number(key, value)?;
            }
            "cache.search_limit" => {
                self.cache.search_limit = parse_number(key, value)?;
            }
            "history.retention_limit" => {
                self.history.retention_limit = parse_number(key, value)?;
            }
            "history.page_size" => {
                self.history.page_size = parse_number(key, value)?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `specscan config show` to see available keys.",
                    key
                ));
            }
        }

        self.validate()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))
}
