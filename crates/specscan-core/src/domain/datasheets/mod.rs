//! Datasheet cache
//!
//! Parsed datasheets keyed by source URL, with a content hash so a
//! fetch-and-parse pipeline can skip documents that have not changed.

mod entity;
mod repository;

pub use entity::{CachedDatasheet, DatasheetCacheStats, DatasheetRecord};
pub use repository::DatasheetCacheRepository;
