use crate::domain::component::SpecMap;
use crate::domain::expiry;
use crate::error::{Error, Result};
use crate::hash::content_hash;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A fetched and parsed datasheet as handed over by the parsing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasheetRecord {
    pub url: String,
    pub part_number: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_specs: Option<SpecMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl DatasheetRecord {
    pub fn new(
        url: impl Into<String>,
        part_number: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            part_number: part_number.into(),
            content_hash: content_hash.into(),
            parsed_specs: None,
            raw_text: None,
            page_count: None,
            file_size: None,
        }
    }

    /// Build a record from the raw document bytes, hashing and sizing them
    pub fn from_content(
        url: impl Into<String>,
        part_number: impl Into<String>,
        content: &[u8],
    ) -> Self {
        let mut record = Self::new(url, part_number, content_hash(content));
        record.file_size = Some(content.len() as u64);
        record
    }

    pub fn with_parsed_specs(mut self, specs: SpecMap) -> Self {
        self.parsed_specs = Some(specs);
        self
    }

    pub fn with_raw_text(mut self, text: impl Into<String>) -> Self {
        self.raw_text = Some(text.into());
        self
    }

    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }
}

/// A datasheet row as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDatasheet {
    pub url: String,
    pub part_number: String,
    pub content_hash: String,
    pub parsed_specs: Option<SpecMap>,
    pub raw_text: Option<String>,
    pub page_count: Option<u32>,
    pub file_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedDatasheet {
    /// A fresh cache row for `record`
    ///
    /// Re-caching a URL replaces the whole row, so there is nothing to keep
    /// from a previous version: `created_at` and the TTL both restart.
    pub fn from_record(record: &DatasheetRecord, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        let url = record.url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("datasheet URL must not be empty".to_string()));
        }
        let content_hash = record.content_hash.trim();
        if content_hash.is_empty() {
            return Err(Error::InvalidInput("content hash must not be empty".to_string()));
        }

        Ok(Self {
            url: url.to_string(),
            part_number: record.part_number.trim().to_string(),
            content_hash: content_hash.to_string(),
            parsed_specs: record.parsed_specs.clone(),
            raw_text: record.raw_text.clone(),
            page_count: record.page_count,
            file_size: record.file_size,
            created_at: now,
            expires_at: Some(expiry(now, ttl)?),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Datasheet cache statistics, computed at call time over every stored row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasheetCacheStats {
    pub total_count: i64,
    pub expired_count: i64,
    /// Sum of `file_size` over rows that recorded one
    pub total_size_bytes: i64,
    /// `created_at` of the oldest stored row
    pub oldest_entry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_content_hashes_and_sizes() {
        let record = DatasheetRecord::from_content("https://x/ds.pdf", "LM2596", b"%PDF-1.4");
        assert_eq!(record.content_hash, content_hash(b"%PDF-1.4"));
        assert_eq!(record.file_size, Some(8));
    }

    #[test]
    fn test_from_record_validates() {
        let now = Utc::now();
        let blank_url = DatasheetRecord::new("  ", "LM2596", "abc");
        assert!(matches!(
            CachedDatasheet::from_record(&blank_url, now, Duration::hours(1)),
            Err(Error::InvalidInput(_))
        ));

        let blank_hash = DatasheetRecord::new("https://x/ds.pdf", "LM2596", "");
        assert!(CachedDatasheet::from_record(&blank_hash, now, Duration::hours(1)).is_err());

        let ok = DatasheetRecord::new(" https://x/ds.pdf ", " LM2596 ", "abc");
        let cached = CachedDatasheet::from_record(&ok, now, Duration::hours(1)).unwrap();
        assert_eq!(cached.url, "https://x/ds.pdf");
        assert_eq!(cached.part_number, "LM2596");
        assert!(!cached.is_expired(now));
    }
}
