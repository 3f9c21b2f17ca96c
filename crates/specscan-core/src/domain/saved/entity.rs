use crate::domain::component::{ComponentCategory, ComponentSpecs, SpecMap};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A bookmarked component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedComponent {
    /// Zero until the row has been written
    pub id: i64,
    pub part_number: String,
    pub manufacturer: String,
    pub category: ComponentCategory,
    pub specs: SpecMap,
    pub notes: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedComponent {
    /// Merge a re-save over the existing row for the same natural key
    ///
    /// Category and specs always take the incoming values. `notes` and `tags`
    /// replace the stored ones only when given (`Some`); `None` keeps what was
    /// there. A blank note clears it.
    pub fn merge(
        existing: Option<&SavedComponent>,
        incoming: &ComponentSpecs,
        notes: Option<&str>,
        tags: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (part_number, manufacturer) = incoming.natural_key()?;

        let notes = match notes {
            Some(notes) => normalize_notes(notes),
            None => existing.and_then(|e| e.notes.clone()),
        };
        let tags = match tags {
            Some(tags) => normalize_tags(tags)?,
            None => existing.map(|e| e.tags.clone()).unwrap_or_default(),
        };

        Ok(Self {
            id: existing.map_or(0, |e| e.id),
            part_number,
            manufacturer,
            category: incoming.category,
            specs: incoming.specs.clone(),
            notes,
            tags,
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
        })
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag.trim())
    }
}

pub(crate) fn normalize_notes(notes: &str) -> Option<String> {
    let notes = notes.trim();
    (!notes.is_empty()).then(|| notes.to_string())
}

/// Trim a tag; blank tags are rejected
pub fn normalize_tag(tag: &str) -> Result<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("tag must not be empty".to_string()));
    }
    Ok(tag.to_string())
}

/// Normalize a tag list into a sorted, deduplicated set
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Result<BTreeSet<String>> {
    tags.iter().map(|tag| normalize_tag(tag.as_ref())).collect()
}
