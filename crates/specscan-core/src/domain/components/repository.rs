//! Component cache repository for database operations

use super::entity::{CachedComponent, ComponentCacheStats};
use crate::config::{DEFAULT_COMPONENT_TTL_HOURS, DEFAULT_SEARCH_LIMIT};
use crate::domain::component::{
    ComponentCategory, ComponentSpecs, SourceType, SpecSource, natural_key,
};
use crate::domain::{confidence, contains_pattern, from_millis, now, prefix_pattern, to_millis};
use crate::error::{Error, Result};
use crate::storage::Database;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

const SELECT_COMPONENT: &str = r#"
    SELECT part_number, manufacturer, category, specs,
           source_type, source_url, source_confidence, retrieved_at,
           datasheet_url, created_at, updated_at, expires_at
    FROM component_cache
"#;

const LIVE: &str = "(expires_at IS NULL OR expires_at > ?)";

/// Repository for the component spec cache
#[derive(Debug, Clone)]
pub struct ComponentCacheRepository {
    db: Database,
    ttl: Duration,
    search_limit: u32,
}

impl ComponentCacheRepository {
    /// Create a repository with the default TTL and search limit
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ttl: Duration::hours(DEFAULT_COMPONENT_TTL_HOURS as i64),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Override how long newly cached entries stay live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the default search result cap
    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ========== Lookups ==========

    /// Most recently updated live entry for a part number, any manufacturer
    pub async fn get_by_part_number(&self, part_number: &str) -> Result<Option<CachedComponent>> {
        let sql = format!(
            "{SELECT_COMPONENT} WHERE part_number = ? AND {LIVE} ORDER BY updated_at DESC, id DESC LIMIT 1"
        );

        let row: Option<ComponentRow> = self
            .db
            .query_one(
                sqlx::query_as(&sql)
                    .bind(part_number.trim())
                    .bind(to_millis(now())),
            )
            .await?;

        row.map(ComponentRow::into_component).transpose()
    }

    /// Exact natural-key lookup of a live entry
    pub async fn get_by_part_number_and_manufacturer(
        &self,
        part_number: &str,
        manufacturer: &str,
    ) -> Result<Option<CachedComponent>> {
        let sql = format!("{SELECT_COMPONENT} WHERE part_number = ? AND manufacturer = ? AND {LIVE}");

        let row: Option<ComponentRow> = self
            .db
            .query_one(
                sqlx::query_as(&sql)
                    .bind(part_number.trim())
                    .bind(manufacturer.trim())
                    .bind(to_millis(now())),
            )
            .await?;

        row.map(ComponentRow::into_component).transpose()
    }

    /// All live entries of a category, most recently updated first
    pub async fn get_by_category(&self, category: ComponentCategory) -> Result<Vec<CachedComponent>> {
        let sql = format!(
            "{SELECT_COMPONENT} WHERE category = ? AND {LIVE} ORDER BY updated_at DESC, id DESC"
        );

        let rows: Vec<ComponentRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(category.as_str())
                    .bind(to_millis(now())),
            )
            .await?;

        rows.into_iter().map(ComponentRow::into_component).collect()
    }

    /// Substring search over part number and manufacturer
    ///
    /// Exact part-number matches rank first, then part-number prefix matches,
    /// then everything else; ties go to the most recently updated entry.
    /// Matching ignores ASCII case. A blank query returns nothing.
    pub async fn search(&self, query: &str, limit: Option<u32>) -> Result<Vec<CachedComponent>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(self.search_limit);
        let pattern = contains_pattern(query);

        let sql = format!(
            r#"{SELECT_COMPONENT}
            WHERE (part_number LIKE ? ESCAPE '\' OR manufacturer LIKE ? ESCAPE '\')
              AND {LIVE}
            ORDER BY CASE
                         WHEN part_number = ? COLLATE NOCASE THEN 0
                         WHEN part_number LIKE ? ESCAPE '\' THEN 1
                         ELSE 2
                     END,
                     updated_at DESC, id DESC
            LIMIT ?"#
        );

        let rows: Vec<ComponentRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(&pattern)
                    .bind(&pattern)
                    .bind(to_millis(now()))
                    .bind(query)
                    .bind(prefix_pattern(query))
                    .bind(i64::from(limit)),
            )
            .await?;

        rows.into_iter().map(ComponentRow::into_component).collect()
    }

    // ========== Writes ==========

    /// Insert or refresh one entry
    pub async fn cache(&self, component: &ComponentSpecs) -> Result<CachedComponent> {
        let component = component.clone();
        let ttl = self.ttl;

        let cached = self
            .db
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let cached = upsert(conn, &component, now(), ttl).await?;
                    Ok::<_, Error>(cached)
                })
            })
            .await?;

        debug!(
            part_number = %cached.part_number,
            manufacturer = %cached.manufacturer,
            "Cached component specs"
        );
        Ok(cached)
    }

    /// Cache several entries atomically: all are written or none are
    pub async fn cache_many(&self, components: &[ComponentSpecs]) -> Result<usize> {
        if components.is_empty() {
            return Ok(0);
        }

        let components = components.to_vec();
        let ttl = self.ttl;

        let count = self
            .db
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let now = now();
                    for component in &components {
                        upsert(&mut *conn, component, now, ttl).await?;
                    }
                    Ok::<_, Error>(components.len())
                })
            })
            .await?;

        info!(count, "Cached batch of component specs");
        Ok(count)
    }

    /// Remove one entry regardless of expiry
    pub async fn delete(&self, part_number: &str, manufacturer: &str) -> Result<bool> {
        let affected = self
            .db
            .execute(
                sqlx::query("DELETE FROM component_cache WHERE part_number = ? AND manufacturer = ?")
                    .bind(part_number.trim())
                    .bind(manufacturer.trim()),
            )
            .await?;

        Ok(affected > 0)
    }

    /// Delete every expired row, returning how many were removed
    pub async fn clean_expired(&self) -> Result<u64> {
        let removed = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM component_cache WHERE expires_at IS NOT NULL AND expires_at <= ?",
                )
                .bind(to_millis(now())),
            )
            .await?;

        if removed > 0 {
            info!(removed, "Removed expired component cache entries");
        }
        Ok(removed)
    }

    /// Delete every row
    pub async fn clear(&self) -> Result<u64> {
        let removed = self.db.execute(sqlx::query("DELETE FROM component_cache")).await?;
        info!(removed, "Cleared component cache");
        Ok(removed)
    }

    // ========== Statistics ==========

    pub async fn get_stats(&self) -> Result<ComponentCacheStats> {
        let total_count: i64 = self
            .db
            .query_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM component_cache"))
            .await?;

        let expired_count: i64 = self
            .db
            .query_scalar(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM component_cache WHERE expires_at IS NOT NULL AND expires_at <= ?",
                )
                .bind(to_millis(now())),
            )
            .await?;

        let by_category: Vec<(String, i64)> = self
            .db
            .query_many(sqlx::query_as(
                "SELECT category, COUNT(*) FROM component_cache GROUP BY category ORDER BY category",
            ))
            .await?;

        Ok(ComponentCacheStats {
            total_count,
            expired_count,
            by_category: by_category.into_iter().collect(),
        })
    }
}

/// Read-merge-write of one entry on an open transaction
async fn upsert(
    conn: &mut SqliteConnection,
    incoming: &ComponentSpecs,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<CachedComponent> {
    let (part_number, manufacturer) = natural_key(&incoming.part_number, &incoming.manufacturer)?;

    let sql = format!("{SELECT_COMPONENT} WHERE part_number = ? AND manufacturer = ?");
    let existing: Option<ComponentRow> = sqlx::query_as(&sql)
        .bind(&part_number)
        .bind(&manufacturer)
        .fetch_optional(&mut *conn)
        .await?;
    let existing = existing.map(ComponentRow::into_component).transpose()?;

    let merged = CachedComponent::merge(existing.as_ref(), incoming, now, ttl)?;

    sqlx::query(
        r#"
        INSERT INTO component_cache (
            part_number, manufacturer, category, specs,
            source_type, source_url, source_confidence, retrieved_at,
            datasheet_url, created_at, updated_at, expires_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(part_number, manufacturer) DO UPDATE SET
            category = excluded.category,
            specs = excluded.specs,
            source_type = excluded.source_type,
            source_url = excluded.source_url,
            source_confidence = excluded.source_confidence,
            retrieved_at = excluded.retrieved_at,
            datasheet_url = excluded.datasheet_url,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(&merged.part_number)
    .bind(&merged.manufacturer)
    .bind(merged.category.as_str())
    .bind(serde_json::to_string(&merged.specs)?)
    .bind(merged.source.source_type.as_str())
    .bind(&merged.source.url)
    .bind(confidence(merged.source.confidence))
    .bind(to_millis(merged.source.retrieved_at))
    .bind(&merged.datasheet_url)
    .bind(to_millis(merged.created_at))
    .bind(to_millis(merged.updated_at))
    .bind(merged.expires_at.map(to_millis))
    .execute(&mut *conn)
    .await?;

    Ok(merged)
}

#[derive(sqlx::FromRow)]
struct ComponentRow {
    part_number: String,
    manufacturer: String,
    category: String,
    specs: String,
    source_type: String,
    source_url: Option<String>,
    source_confidence: f64,
    retrieved_at: i64,
    datasheet_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    expires_at: Option<i64>,
}

impl ComponentRow {
    fn into_component(self) -> Result<CachedComponent> {
        let category = ComponentCategory::parse_stored(&self.category)?;
        let source_type = SourceType::from_str(&self.source_type)
            .ok_or_else(|| Error::Parse(format!("Invalid source type: {}", self.source_type)))?;
        let specs = serde_json::from_str(&self.specs)
            .map_err(|e| Error::Parse(format!("Invalid specs JSON: {}", e)))?;

        Ok(CachedComponent {
            part_number: self.part_number,
            manufacturer: self.manufacturer,
            category,
            specs,
            source: SpecSource {
                source_type,
                url: self.source_url,
                confidence: self.source_confidence,
                retrieved_at: from_millis(self.retrieved_at)?,
            },
            datasheet_url: self.datasheet_url,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            expires_at: self.expires_at.map(from_millis).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::SpecValue;

    fn repo() -> ComponentCacheRepository {
        ComponentCacheRepository::new(Database::in_memory())
    }

    fn component(part_number: &str, manufacturer: &str) -> ComponentSpecs {
        ComponentSpecs::new(
            part_number,
            manufacturer,
            ComponentCategory::VoltageRegulator,
            SpecSource::new(SourceType::Datasheet, 0.95).with_url("https://example.com/ds.pdf"),
        )
        .with_spec("max_output_current", SpecValue::nominal(3.0, "A"))
        .with_spec("input_voltage", SpecValue::range(Some(4.5), Some(40.0), "V"))
    }

    #[tokio::test]
    async fn test_cache_and_get() {
        let repo = repo();
        repo.cache(&component("LM2596", "TI")).await.unwrap();

        let found = repo.get_by_part_number("LM2596").await.unwrap().unwrap();
        assert_eq!(found.manufacturer, "TI");
        assert_eq!(found.specs.len(), 2);
        assert_eq!(found.specs["input_voltage"].max, Some(40.0));
        assert_eq!(found.source.url.as_deref(), Some("https://example.com/ds.pdf"));

        let exact = repo
            .get_by_part_number_and_manufacturer("LM2596", "TI")
            .await
            .unwrap();
        assert_eq!(exact, Some(found));

        assert!(repo.get_by_part_number("LM317").await.unwrap().is_none());
        assert!(
            repo.get_by_part_number_and_manufacturer("LM2596", "ST")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_recache_updates_in_place() {
        let repo = repo();
        let first = repo.cache(&component("LM2596", "TI")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = component("LM2596", "TI")
            .with_spec("max_output_current", SpecValue::nominal(2.5, "A"));
        let second = repo.cache(&updated).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_count, 1);

        let found = repo.get_by_part_number("LM2596").await.unwrap().unwrap();
        assert_eq!(found.specs["max_output_current"].value, Some(2.5));
        assert_eq!(found.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_get_by_part_number_prefers_most_recent() {
        let repo = repo();
        repo.cache(&component("NE555", "TI")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.cache(&component("NE555", "ST")).await.unwrap();

        let found = repo.get_by_part_number("NE555").await.unwrap().unwrap();
        assert_eq!(found.manufacturer, "ST");
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let db = Database::in_memory();
        let expired = ComponentCacheRepository::new(db.clone()).with_ttl(Duration::zero());
        let live = ComponentCacheRepository::new(db);

        expired.cache(&component("LM2596", "TI")).await.unwrap();
        live.cache(&component("LM317", "TI")).await.unwrap();

        assert!(live.get_by_part_number("LM2596").await.unwrap().is_none());
        assert!(
            live.get_by_part_number_and_manufacturer("LM2596", "TI")
                .await
                .unwrap()
                .is_none()
        );
        let by_category = live
            .get_by_category(ComponentCategory::VoltageRegulator)
            .await
            .unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].part_number, "LM317");

        let results = live.search("LM", None).await.unwrap();
        assert_eq!(results.len(), 1);

        // Still physically present until cleaned
        let stats = live.get_stats().await.unwrap();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.expired_count, 1);

        assert_eq!(live.clean_expired().await.unwrap(), 1);
        assert_eq!(live.clean_expired().await.unwrap(), 0);
        assert_eq!(live.get_stats().await.unwrap().total_count, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let repo = repo().with_ttl(Duration::MAX);

        let err = repo.cache(&component("LM2596", "TI")).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidInput(_)));
        assert_eq!(repo.get_stats().await.unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_nan_confidence_is_stored_as_zero() {
        let repo = repo();
        let mut part = component("LM2596", "TI");
        part.source.confidence = f64::NAN;

        repo.cache(&part).await.unwrap();

        let found = repo.get_by_part_number("LM2596").await.unwrap().unwrap();
        assert_eq!(found.source.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_search_ranking() {
        let repo = repo();
        // Inserted oldest to newest
        for (pn, mfr) in [
            ("LM2596", "TI"),
            ("XLM2596-ADJ", "Generic"),
            ("LM2596S", "ON Semi"),
            ("MP1584", "LM Power"),
        ] {
            repo.cache(&component(pn, mfr)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }

        let results = repo.search("lm2596", None).await.unwrap();
        let order: Vec<&str> = results.iter().map(|c| c.part_number.as_str()).collect();
        assert_eq!(order, vec!["LM2596", "LM2596S", "XLM2596-ADJ"]);

        // Manufacturer matches rank with the substring matches, newest first
        let results = repo.search("LM", None).await.unwrap();
        let order: Vec<&str> = results.iter().map(|c| c.part_number.as_str()).collect();
        assert_eq!(order, vec!["LM2596S", "LM2596", "MP1584", "XLM2596-ADJ"]);

        let limited = repo.search("LM", Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);

        assert!(repo.search("   ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let repo = repo();
        repo.cache(&component("AB_12", "X")).await.unwrap();
        repo.cache(&component("ABC12", "X")).await.unwrap();

        let results = repo.search("B_1", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].part_number, "AB_12");

        assert!(repo.search("%", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_many_is_atomic() {
        let repo = repo();

        let good = vec![component("LM2596", "TI"), component("LM317", "TI")];
        assert_eq!(repo.cache_many(&good).await.unwrap(), 2);

        let bad = vec![component("AMS1117", "AMS"), component("  ", "Nobody")];
        let err = repo.cache_many(&bad).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert!(repo.get_by_part_number("AMS1117").await.unwrap().is_none());
        assert_eq!(repo.get_stats().await.unwrap().total_count, 2);
        assert_eq!(repo.cache_many(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats_by_category() {
        let repo = repo();
        repo.cache(&component("LM2596", "TI")).await.unwrap();
        repo.cache(&component("LM317", "TI")).await.unwrap();
        repo.cache(&ComponentSpecs::new(
            "18650-35E",
            "Samsung",
            ComponentCategory::Battery,
            SpecSource::new(SourceType::Distributor, 0.8),
        ))
        .await
        .unwrap();

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.expired_count, 0);
        assert_eq!(stats.by_category.get("voltage_regulator"), Some(&2));
        assert_eq!(stats.by_category.get("battery"), Some(&1));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let repo = repo();
        repo.cache(&component("LM2596", "TI")).await.unwrap();
        repo.cache(&component("LM317", "TI")).await.unwrap();

        assert!(repo.delete("LM2596", "TI").await.unwrap());
        assert!(!repo.delete("LM2596", "TI").await.unwrap());
        assert_eq!(repo.clear().await.unwrap(), 1);
        assert_eq!(repo.get_stats().await.unwrap().total_count, 0);
    }
}
