//! Saved components
//!
//! Components the user bookmarked, with free-form notes and tags. Unlike the
//! caches nothing here expires and there is no size bound.

mod entity;
mod repository;

pub use entity::{SavedComponent, normalize_tag, normalize_tags};
pub use repository::SavedComponentRepository;
