//! Component spec cache
//!
//! TTL cache of resolved component specs keyed by `(part_number, manufacturer)`.
//! Expired rows stay in the table but are invisible to every read until
//! `clean_expired` removes them.

mod entity;
mod repository;

pub use entity::{CachedComponent, ComponentCacheStats};
pub use repository::ComponentCacheRepository;
