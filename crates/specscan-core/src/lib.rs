//! Specscan Core Library
//!
//! Local persistence for the specscan component scanner:
//! - Storage (single SQLite handle, versioned migrations)
//! - Component spec cache and datasheet cache with TTL expiry
//! - Scan history log with a retention ceiling
//! - Saved components with notes and tags
//! - Configuration and aggregated statistics

pub mod config;
pub mod domain;
pub mod error;
pub mod hash;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
pub use store::{CleanupReport, DatabaseStats, Store};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::components::{CachedComponent, ComponentCacheRepository};
    pub use crate::domain::datasheets::{CachedDatasheet, DatasheetCacheRepository, DatasheetRecord};
    pub use crate::domain::history::{
        Claim, ScanComponent, ScanHistoryRepository, ScanVerdict, VerdictKind,
    };
    pub use crate::domain::saved::{SavedComponent, SavedComponentRepository};
    pub use crate::domain::{ComponentCategory, ComponentSpecs, SourceType, SpecSource, SpecValue};
    pub use crate::error::{Error, Result};
    pub use crate::storage::{Database, DatabaseConfig};
    pub use crate::store::Store;
}
