//! Scan history repository for database operations

use super::entity::{
    BoundingBox, Claim, HistoryStats, ScanComponent, ScanHistoryEntry, ScanSummary, ScanVerdict,
    VerdictKind,
};
use crate::config::DEFAULT_SCAN_HISTORY_LIMIT;
use crate::domain::component::ComponentCategory;
use crate::domain::{confidence, contains_pattern, from_millis, now, to_millis};
use crate::error::{Error, Result};
use crate::storage::Database;
use sqlx::SqliteConnection;
use tracing::{debug, info};

const SELECT_SUMMARY: &str = r#"
    SELECT id, claim_raw, claim_value, claim_unit, verdict_type, component_count, created_at
    FROM scan_history
"#;

/// Repository for the scan history log
#[derive(Debug, Clone)]
pub struct ScanHistoryRepository {
    db: Database,
    retention_limit: u32,
}

impl ScanHistoryRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            retention_limit: DEFAULT_SCAN_HISTORY_LIMIT,
        }
    }

    /// Cap the log at `limit` scans (at least one)
    pub fn with_retention_limit(mut self, limit: u32) -> Self {
        self.retention_limit = limit.max(1);
        self
    }

    pub fn retention_limit(&self) -> u32 {
        self.retention_limit
    }

    /// Log a completed scan, returning its id
    ///
    /// The scan row, its component rows and any eviction of the oldest scans
    /// past the retention limit commit together or not at all.
    pub async fn save(
        &self,
        claim: &Claim,
        verdict: &ScanVerdict,
        components: &[ScanComponent],
    ) -> Result<i64> {
        let claim = claim.clone();
        let verdict = verdict.clone();
        let components = components.to_vec();
        let retention_limit = i64::from(self.retention_limit);

        let (id, evicted) = self
            .db
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let id = insert_scan(&mut *conn, &claim, &verdict, &components).await?;
                    let evicted = enforce_retention(&mut *conn, retention_limit).await?;
                    Ok::<_, Error>((id, evicted))
                })
            })
            .await?;

        debug!(scan_id = id, evicted, "Saved scan to history");
        Ok(id)
    }

    /// Full scan with its components
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ScanHistoryEntry>> {
        let row: Option<ScanRow> = self
            .db
            .query_one(
                sqlx::query_as(
                    r#"
                    SELECT id, claim_raw, claim_value, claim_unit, claim_type,
                           verdict_type, verdict, created_at
                    FROM scan_history
                    WHERE id = ?
                    "#,
                )
                .bind(id),
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let components: Vec<ScanComponentRow> = self
            .db
            .query_many(
                sqlx::query_as(
                    r#"
                    SELECT part_number, manufacturer, category, bounding_box, confidence
                    FROM scan_components
                    WHERE scan_id = ?
                    ORDER BY position ASC
                    "#,
                )
                .bind(id),
            )
            .await?;

        let components = components
            .into_iter()
            .map(ScanComponentRow::into_component)
            .collect::<Result<Vec<_>>>()?;

        row.into_entry(components).map(Some)
    }

    /// Page through the log, most recent first
    pub async fn get_recent(&self, limit: u32, offset: u32) -> Result<Vec<ScanSummary>> {
        let sql = format!("{SELECT_SUMMARY} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let rows: Vec<SummaryRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(i64::from(limit))
                    .bind(i64::from(offset)),
            )
            .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    pub async fn get_by_verdict_type(
        &self,
        verdict: VerdictKind,
        limit: u32,
    ) -> Result<Vec<ScanSummary>> {
        let sql = format!(
            "{SELECT_SUMMARY} WHERE verdict_type = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        );

        let rows: Vec<SummaryRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(verdict.as_str())
                    .bind(i64::from(limit)),
            )
            .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// Scans whose claim text or detected part numbers contain `text`
    pub async fn search(&self, text: &str, limit: u32) -> Result<Vec<ScanSummary>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = contains_pattern(text);

        let sql = format!(
            r#"{SELECT_SUMMARY}
            WHERE claim_raw LIKE ? ESCAPE '\'
               OR EXISTS (
                   SELECT 1 FROM scan_components c
                   WHERE c.scan_id = scan_history.id
                     AND (c.part_number LIKE ? ESCAPE '\' OR c.manufacturer LIKE ? ESCAPE '\')
               )
            ORDER BY created_at DESC, id DESC
            LIMIT ?"#
        );

        let rows: Vec<SummaryRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(&pattern)
                    .bind(&pattern)
                    .bind(&pattern)
                    .bind(i64::from(limit)),
            )
            .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    pub async fn get_count(&self) -> Result<i64> {
        self.db
            .query_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM scan_history"))
            .await
    }

    /// The scan next in line for eviction
    pub async fn get_oldest(&self) -> Result<Option<ScanSummary>> {
        let sql = format!("{SELECT_SUMMARY} ORDER BY created_at ASC, id ASC LIMIT 1");

        let row: Option<SummaryRow> = self.db.query_one(sqlx::query_as(&sql)).await?;
        row.map(SummaryRow::into_summary).transpose()
    }

    /// Delete one scan; its component rows go with it
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .db
            .execute(sqlx::query("DELETE FROM scan_history WHERE id = ?").bind(id))
            .await?;

        Ok(affected > 0)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.db.execute(sqlx::query("DELETE FROM scan_history")).await?;
        info!(removed, "Cleared scan history");
        Ok(removed)
    }

    pub async fn get_stats(&self) -> Result<HistoryStats> {
        let (total_scans, last_scan_at): (i64, Option<i64>) = self
            .db
            .query_one(sqlx::query_as(
                "SELECT COUNT(*), MAX(created_at) FROM scan_history",
            ))
            .await?
            .unwrap_or((0, None));

        let by_verdict_type: Vec<(String, i64)> = self
            .db
            .query_many(sqlx::query_as(
                "SELECT verdict_type, COUNT(*) FROM scan_history GROUP BY verdict_type ORDER BY verdict_type",
            ))
            .await?;

        Ok(HistoryStats {
            total_scans,
            by_verdict_type: by_verdict_type.into_iter().collect(),
            last_scan_at: last_scan_at.map(from_millis).transpose()?,
        })
    }
}

async fn insert_scan(
    conn: &mut SqliteConnection,
    claim: &Claim,
    verdict: &ScanVerdict,
    components: &[ScanComponent],
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO scan_history (
            claim_raw, claim_value, claim_unit, claim_type,
            verdict_type, verdict, component_count, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&claim.raw)
    .bind(claim.value)
    .bind(&claim.unit)
    .bind(&claim.claim_type)
    .bind(verdict.verdict.as_str())
    .bind(serde_json::to_string(verdict)?)
    .bind(components.len() as i64)
    .bind(to_millis(now()))
    .execute(&mut *conn)
    .await?;

    let scan_id = result.last_insert_rowid();

    for (position, component) in components.iter().enumerate() {
        let bounding_box = component
            .bounding_box
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO scan_components (
                scan_id, position, part_number, manufacturer, category, bounding_box, confidence
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(scan_id)
        .bind(position as i64)
        .bind(component.part_number.trim())
        .bind(component.manufacturer.trim())
        .bind(component.category.as_str())
        .bind(bounding_box)
        .bind(confidence(component.confidence))
        .execute(&mut *conn)
        .await?;
    }

    Ok(scan_id)
}

/// Delete the oldest scans beyond `limit`, returning how many went
async fn enforce_retention(conn: &mut SqliteConnection, limit: i64) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_history")
        .fetch_one(&mut *conn)
        .await?;

    if count <= limit {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        DELETE FROM scan_history
        WHERE id IN (
            SELECT id FROM scan_history
            ORDER BY created_at ASC, id ASC
            LIMIT ?
        )
        "#,
    )
    .bind(count - limit)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

fn parse_verdict_kind(s: &str) -> Result<VerdictKind> {
    VerdictKind::from_str(s).ok_or_else(|| Error::Parse(format!("Invalid verdict type: {}", s)))
}

#[derive(sqlx::FromRow)]
struct ScanRow {
    id: i64,
    claim_raw: String,
    claim_value: Option<f64>,
    claim_unit: Option<String>,
    claim_type: Option<String>,
    verdict_type: String,
    verdict: String,
    created_at: i64,
}

impl ScanRow {
    fn into_entry(self, components: Vec<ScanComponent>) -> Result<ScanHistoryEntry> {
        let mut verdict: ScanVerdict = serde_json::from_str(&self.verdict)
            .map_err(|e| Error::Parse(format!("Invalid verdict JSON: {}", e)))?;
        // The indexed column is authoritative for the kind
        verdict.verdict = parse_verdict_kind(&self.verdict_type)?;

        Ok(ScanHistoryEntry {
            id: self.id,
            claim: Claim {
                raw: self.claim_raw,
                value: self.claim_value,
                unit: self.claim_unit,
                claim_type: self.claim_type,
            },
            verdict,
            components,
            created_at: from_millis(self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    claim_raw: String,
    claim_value: Option<f64>,
    claim_unit: Option<String>,
    verdict_type: String,
    component_count: i64,
    created_at: i64,
}

impl SummaryRow {
    fn into_summary(self) -> Result<ScanSummary> {
        Ok(ScanSummary {
            id: self.id,
            claim_raw: self.claim_raw,
            claim_value: self.claim_value,
            claim_unit: self.claim_unit,
            verdict_type: parse_verdict_kind(&self.verdict_type)?,
            component_count: self.component_count,
            created_at: from_millis(self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScanComponentRow {
    part_number: String,
    manufacturer: String,
    category: String,
    bounding_box: Option<String>,
    confidence: f64,
}

impl ScanComponentRow {
    fn into_component(self) -> Result<ScanComponent> {
        let bounding_box = self
            .bounding_box
            .as_deref()
            .map(serde_json::from_str::<BoundingBox>)
            .transpose()
            .map_err(|e| Error::Parse(format!("Invalid bounding box JSON: {}", e)))?;

        Ok(ScanComponent {
            part_number: self.part_number,
            manufacturer: self.manufacturer,
            category: ComponentCategory::parse_stored(&self.category)?,
            bounding_box,
            confidence: self.confidence,
        })
    }
}
