//! Datasheet cache repository for database operations

use super::entity::{CachedDatasheet, DatasheetCacheStats, DatasheetRecord};
use crate::config::DEFAULT_DATASHEET_TTL_HOURS;
use crate::domain::component::SpecMap;
use crate::domain::{from_millis, now, to_millis};
use crate::error::{Error, Result};
use crate::storage::Database;
use chrono::Duration;
use tracing::{debug, info};

const SELECT_DATASHEET: &str = r#"
    SELECT url, part_number, content_hash, parsed_specs, raw_text,
           page_count, file_size, created_at, expires_at
    FROM datasheet_cache
"#;

const LIVE: &str = "(expires_at IS NULL OR expires_at > ?)";

/// Repository for the datasheet cache
#[derive(Debug, Clone)]
pub struct DatasheetCacheRepository {
    db: Database,
    ttl: Duration,
}

impl DatasheetCacheRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ttl: Duration::hours(DEFAULT_DATASHEET_TTL_HOURS as i64),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live entry for a source URL
    pub async fn get_by_url(&self, url: &str) -> Result<Option<CachedDatasheet>> {
        let sql = format!("{SELECT_DATASHEET} WHERE url = ? AND {LIVE}");

        let row: Option<DatasheetRow> = self
            .db
            .query_one(sqlx::query_as(&sql).bind(url.trim()).bind(to_millis(now())))
            .await?;

        row.map(DatasheetRow::into_datasheet).transpose()
    }

    /// Newest live entry for a part number
    pub async fn get_by_part_number(&self, part_number: &str) -> Result<Option<CachedDatasheet>> {
        let sql = format!(
            "{SELECT_DATASHEET} WHERE part_number = ? AND {LIVE} ORDER BY created_at DESC, url ASC LIMIT 1"
        );

        let row: Option<DatasheetRow> = self
            .db
            .query_one(
                sqlx::query_as(&sql)
                    .bind(part_number.trim())
                    .bind(to_millis(now())),
            )
            .await?;

        row.map(DatasheetRow::into_datasheet).transpose()
    }

    /// Insert or replace the entry for the record's URL
    pub async fn cache(&self, record: &DatasheetRecord) -> Result<CachedDatasheet> {
        let cached = CachedDatasheet::from_record(record, now(), self.ttl)?;

        self.db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO datasheet_cache (
                        url, part_number, content_hash, parsed_specs, raw_text,
                        page_count, file_size, created_at, expires_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(url) DO UPDATE SET
                        part_number = excluded.part_number,
                        content_hash = excluded.content_hash,
                        parsed_specs = excluded.parsed_specs,
                        raw_text = excluded.raw_text,
                        page_count = excluded.page_count,
                        file_size = excluded.file_size,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at
                    "#,
                )
                .bind(&cached.url)
                .bind(&cached.part_number)
                .bind(&cached.content_hash)
                .bind(cached.parsed_specs.as_ref().map(serde_json::to_string).transpose()?)
                .bind(&cached.raw_text)
                .bind(cached.page_count.map(i64::from))
                .bind(cached.file_size.map(size_to_i64).transpose()?)
                .bind(to_millis(cached.created_at))
                .bind(cached.expires_at.map(to_millis)),
            )
            .await?;

        debug!(url = %cached.url, part_number = %cached.part_number, "Cached datasheet");
        Ok(cached)
    }

    /// Whether `new_hash` differs from what is cached for `url`
    ///
    /// A missing or expired entry counts as changed.
    pub async fn has_content_changed(&self, url: &str, new_hash: &str) -> Result<bool> {
        let stored: Option<String> = self
            .db
            .query_scalar(
                sqlx::query_scalar(&format!(
                    "SELECT (SELECT content_hash FROM datasheet_cache WHERE url = ? AND {LIVE})"
                ))
                .bind(url.trim())
                .bind(to_millis(now())),
            )
            .await?;

        Ok(stored.as_deref() != Some(new_hash.trim()))
    }

    /// Replace only the parsed specs of a live entry
    ///
    /// Hash, text and expiry are left alone. Returns whether a row changed.
    pub async fn update_parsed_specs(&self, url: &str, specs: &SpecMap) -> Result<bool> {
        let affected = self
            .db
            .execute(
                sqlx::query(&format!(
                    "UPDATE datasheet_cache SET parsed_specs = ? WHERE url = ? AND {LIVE}"
                ))
                .bind(serde_json::to_string(specs)?)
                .bind(url.trim())
                .bind(to_millis(now())),
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn delete(&self, url: &str) -> Result<bool> {
        let affected = self
            .db
            .execute(sqlx::query("DELETE FROM datasheet_cache WHERE url = ?").bind(url.trim()))
            .await?;

        Ok(affected > 0)
    }

    /// Delete every expired row, returning how many were removed
    pub async fn clean_expired(&self) -> Result<u64> {
        let removed = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM datasheet_cache WHERE expires_at IS NOT NULL AND expires_at <= ?",
                )
                .bind(to_millis(now())),
            )
            .await?;

        if removed > 0 {
            info!(removed, "Removed expired datasheet cache entries");
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<u64> {
        let removed = self.db.execute(sqlx::query("DELETE FROM datasheet_cache")).await?;
        info!(removed, "Cleared datasheet cache");
        Ok(removed)
    }

    pub async fn get_stats(&self) -> Result<DatasheetCacheStats> {
        let (total_count, expired_count, total_size_bytes, oldest): (i64, i64, i64, Option<i64>) =
            self.db
                .query_one(
                    sqlx::query_as(
                        r#"
                        SELECT COUNT(*),
                               COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at <= ? THEN 1 ELSE 0 END), 0),
                               COALESCE(SUM(file_size), 0),
                               MIN(created_at)
                        FROM datasheet_cache
                        "#,
                    )
                    .bind(to_millis(now())),
                )
                .await?
                .unwrap_or((0, 0, 0, None));

        Ok(DatasheetCacheStats {
            total_count,
            expired_count,
            total_size_bytes,
            oldest_entry: oldest.map(from_millis).transpose()?,
        })
    }
}

fn size_to_i64(size: u64) -> Result<i64> {
    i64::try_from(size).map_err(|_| Error::InvalidInput(format!("file size too large: {}", size)))
}

#[derive(sqlx::FromRow)]
struct DatasheetRow {
    url: String,
    part_number: String,
    content_hash: String,
    parsed_specs: Option<String>,
    raw_text: Option<String>,
    page_count: Option<i64>,
    file_size: Option<i64>,
    created_at: i64,
    expires_at: Option<i64>,
}

impl DatasheetRow {
    fn into_datasheet(self) -> Result<CachedDatasheet> {
        let parsed_specs = self
            .parsed_specs
            .as_deref()
            .map(serde_json::from_str::<SpecMap>)
            .transpose()
            .map_err(|e| Error::Parse(format!("Invalid parsed specs JSON: {}", e)))?;

        Ok(CachedDatasheet {
            url: self.url,
            part_number: self.part_number,
            content_hash: self.content_hash,
            parsed_specs,
            raw_text: self.raw_text,
            page_count: self.page_count.and_then(|n| u32::try_from(n).ok()),
            file_size: self.file_size.and_then(|n| u64::try_from(n).ok()),
            created_at: from_millis(self.created_at)?,
            expires_at: self.expires_at.map(from_millis).transpose()?,
        })
    }
}
