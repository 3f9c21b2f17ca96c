//! Domain layer - the repositories built on top of `storage`
//!
//! - `component`: records supplied by upstream collaborators
//! - `components`: TTL cache of resolved component specs
//! - `datasheets`: TTL cache of parsed datasheets, keyed by URL
//! - `history`: bounded log of completed scans
//! - `saved`: user-curated saved components with notes and tags
//!
//! Repositories hold no state of their own beyond fixed settings; they are
//! cheap clones over a shared [`Database`](crate::storage::Database).

pub mod component;
pub mod components;
pub mod datasheets;
pub mod history;
pub mod saved;

pub use component::{
    ComponentCategory, ComponentSpecs, SourceType, SpecMap, SpecSource, SpecValue, natural_key,
};

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};

/// Current time truncated to the millisecond precision stored in the database
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Parse(format!("Invalid timestamp: {}", millis)))
}

/// When an entry cached at `now` with `ttl` expires
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| Error::InvalidInput(format!("TTL of {} is out of range", ttl)))
}

/// Confidence in `[0, 1]`; NaN becomes 0
pub(crate) fn confidence(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Escape LIKE wildcards; pair with `ESCAPE '\'` in SQL
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%text%` with wildcards in `text` escaped
pub(crate) fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}

/// `text%` with wildcards in `text` escaped
pub(crate) fn prefix_pattern(text: &str) -> String {
    format!("{}%", escape_like(text))
}
