//! Cached component entity and merge policy

use crate::domain::component::{ComponentCategory, ComponentSpecs, SpecMap, SpecSource};
use crate::domain::expiry;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A component spec record as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedComponent {
    pub part_number: String,
    pub manufacturer: String,
    pub category: ComponentCategory,
    pub specs: SpecMap,
    pub source: SpecSource,
    pub datasheet_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedComponent {
    /// Merge an incoming record over the existing cache row for the same key
    ///
    /// Incoming specs, source, category and datasheet URL replace the stored
    /// ones, `updated_at` becomes `now` and the TTL restarts. `created_at` is
    /// kept from the first insertion.
    pub fn merge(
        existing: Option<&CachedComponent>,
        incoming: &ComponentSpecs,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        let (part_number, manufacturer) = incoming.natural_key()?;

        Ok(Self {
            part_number,
            manufacturer,
            category: incoming.category,
            specs: incoming.specs.clone(),
            source: incoming.source.clone(),
            datasheet_url: incoming.datasheet_url.clone(),
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
            expires_at: Some(expiry(now, ttl)?),
        })
    }

    /// Whether the entry has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Back to the record shape upstream collaborators use
    pub fn to_specs(&self) -> ComponentSpecs {
        ComponentSpecs {
            part_number: self.part_number.clone(),
            manufacturer: self.manufacturer.clone(),
            category: self.category,
            specs: self.specs.clone(),
            source: self.source.clone(),
            datasheet_url: self.datasheet_url.clone(),
        }
    }
}

/// Component cache statistics, computed at call time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentCacheStats {
    /// Rows in the table, expired or not
    pub total_count: i64,
    /// Rows past their expiry that `clean_expired` would remove
    pub expired_count: i64,
    /// Row count per category
    pub by_category: BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{SourceType, SpecValue};

    fn incoming(capacity: f64) -> ComponentSpecs {
        ComponentSpecs::new(
            " 18650-35E ",
            "Samsung",
            ComponentCategory::Battery,
            SpecSource::new(SourceType::Datasheet, 0.9),
        )
        .with_spec("capacity", SpecValue::nominal(capacity, "mAh"))
    }

    #[test]
    fn test_merge_new_entry() {
        let now = Utc::now();
        let merged =
            CachedComponent::merge(None, &incoming(3500.0), now, Duration::hours(1)).unwrap();

        assert_eq!(merged.part_number, "18650-35E");
        assert_eq!(merged.created_at, now);
        assert_eq!(merged.updated_at, now);
        assert_eq!(merged.expires_at, Some(now + Duration::hours(1)));
    }

    #[test]
    fn test_merge_preserves_created_at_and_overwrites_specs() {
        let first = Utc::now() - Duration::days(2);
        let existing =
            CachedComponent::merge(None, &incoming(3500.0), first, Duration::hours(1)).unwrap();

        let now = Utc::now();
        let merged =
            CachedComponent::merge(Some(&existing), &incoming(3400.0), now, Duration::hours(1))
                .unwrap();

        assert_eq!(merged.created_at, first);
        assert_eq!(merged.updated_at, now);
        assert_eq!(merged.specs["capacity"].value, Some(3400.0));
        assert!(!merged.is_expired(now));
        assert!(existing.is_expired(now));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let now = Utc::now();
        let merged = CachedComponent::merge(None, &incoming(1.0), now, Duration::zero()).unwrap();
        assert!(merged.is_expired(now));
    }
}
