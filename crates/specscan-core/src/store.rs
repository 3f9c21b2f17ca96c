//! One database handle with every repository built over it
//!
//! Callers construct a [`Store`] once and hand out the repositories they need.
//! All repositories share the single handle owned by the [`Database`].

use crate::config::Config;
use crate::domain::components::{ComponentCacheRepository, ComponentCacheStats};
use crate::domain::datasheets::{DatasheetCacheRepository, DatasheetCacheStats};
use crate::domain::history::{HistoryStats, ScanHistoryRepository};
use crate::domain::saved::SavedComponentRepository;
use crate::error::{Error, Result};
use crate::storage::{Database, DatabaseConfig};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// Statistics across every repository
///
/// Each section is `None` when gathering it failed; see [`Store::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub components: Option<ComponentCacheStats>,
    pub datasheets: Option<DatasheetCacheStats>,
    pub history: Option<HistoryStats>,
    pub saved_count: Option<i64>,
}

/// Rows removed by [`Store::clean_expired`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub components: u64,
    pub datasheets: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.components + self.datasheets
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
    components: ComponentCacheRepository,
    datasheets: DatasheetCacheRepository,
    history: ScanHistoryRepository,
    saved: SavedComponentRepository,
}

impl Store {
    /// Build the repositories over `db` with the TTLs and limits in `config`
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            components: ComponentCacheRepository::new(db.clone())
                .with_ttl(config.cache.component_ttl())
                .with_search_limit(config.cache.search_limit),
            datasheets: DatasheetCacheRepository::new(db.clone())
                .with_ttl(config.cache.datasheet_ttl()),
            history: ScanHistoryRepository::new(db.clone())
                .with_retention_limit(config.history.retention_limit),
            saved: SavedComponentRepository::new(db.clone()),
            db,
        }
    }

    /// Store over the configured database file, opened on first use
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config
            .storage
            .resolved_database_path()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let db = Database::new(
            DatabaseConfig::with_path(path).busy_timeout(config.storage.busy_timeout()),
        );
        Ok(Self::new(db, config))
    }

    /// In-memory store with default settings (useful for testing)
    pub fn in_memory() -> Self {
        Self::new(Database::in_memory(), &Config::default())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn components(&self) -> &ComponentCacheRepository {
        &self.components
    }

    pub fn datasheets(&self) -> &DatasheetCacheRepository {
        &self.datasheets
    }

    pub fn history(&self) -> &ScanHistoryRepository {
        &self.history
    }

    pub fn saved(&self) -> &SavedComponentRepository {
        &self.saved
    }

    /// Gather statistics from every repository concurrently
    ///
    /// Best effort: a failing section is logged and reported as `None`, and
    /// never fails the call.
    pub async fn stats(&self) -> DatabaseStats {
        let (components, datasheets, history, saved_count) = tokio::join!(
            best_effort("components", self.components.get_stats()),
            best_effort("datasheets", self.datasheets.get_stats()),
            best_effort("history", self.history.get_stats()),
            best_effort("saved", self.saved.count()),
        );

        DatabaseStats {
            components,
            datasheets,
            history,
            saved_count,
        }
    }

    /// Remove expired rows from both caches
    pub async fn clean_expired(&self) -> Result<CleanupReport> {
        let report = CleanupReport {
            components: self.components.clean_expired().await?,
            datasheets: self.datasheets.clean_expired().await?,
        };

        info!(
            components = report.components,
            datasheets = report.datasheets,
            "Cleaned expired cache entries"
        );
        Ok(report)
    }
}

async fn best_effort<T>(section: &'static str, stats: impl Future<Output = Result<T>>) -> Option<T> {
    match stats.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(section, error = %err, "Statistics unavailable");
            None
        }
    }
}
