//! Saved component repository for database operations

use super::entity::{SavedComponent, normalize_notes, normalize_tag};
use crate::domain::component::{ComponentCategory, ComponentSpecs};
use crate::domain::{contains_pattern, from_millis, now, to_millis};
use crate::error::{Error, Result};
use crate::storage::Database;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::{debug, info};

const SELECT_SAVED: &str = r#"
    SELECT id, part_number, manufacturer, category, specs, notes, tags, created_at, updated_at
    FROM saved_components
"#;

const NEWEST_FIRST: &str = "ORDER BY updated_at DESC, id DESC";

/// Repository for saved components
#[derive(Debug, Clone)]
pub struct SavedComponentRepository {
    db: Database,
}

impl SavedComponentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Save a component, merging into an existing entry with the same key
    ///
    /// Specs and category always take the incoming values; `notes` and `tags`
    /// only replace what is stored when given. Returns the entry id.
    pub async fn save(
        &self,
        component: &ComponentSpecs,
        notes: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<i64> {
        let component = component.clone();
        let notes = notes.map(str::to_string);
        let tags = tags.map(<[String]>::to_vec);

        let saved = self
            .db
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let (part_number, manufacturer) = component.natural_key()?;
                    let existing = fetch_by_key(&mut *conn, &part_number, &manufacturer).await?;
                    let merged = SavedComponent::merge(
                        existing.as_ref(),
                        &component,
                        notes.as_deref(),
                        tags.as_deref(),
                        now(),
                    )?;
                    let saved = write(&mut *conn, merged).await?;
                    Ok::<_, Error>(saved)
                })
            })
            .await?;

        debug!(
            id = saved.id,
            part_number = %saved.part_number,
            manufacturer = %saved.manufacturer,
            "Saved component"
        );
        Ok(saved.id)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SavedComponent>> {
        let sql = format!("{SELECT_SAVED} WHERE id = ?");
        let row: Option<SavedRow> = self.db.query_one(sqlx::query_as(&sql).bind(id)).await?;
        row.map(SavedRow::into_saved).transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<SavedComponent>> {
        let sql = format!("{SELECT_SAVED} {NEWEST_FIRST}");
        let rows: Vec<SavedRow> = self.db.query_many(sqlx::query_as(&sql)).await?;
        rows.into_iter().map(SavedRow::into_saved).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .query_scalar(sqlx::query_scalar("SELECT COUNT(*) FROM saved_components"))
            .await
    }

    /// Add a tag; adding one that is already present is a successful no-op
    ///
    /// Returns false only when no entry has this id.
    pub async fn add_tag(&self, id: i64, tag: &str) -> Result<bool> {
        let tag = normalize_tag(tag)?;
        self.edit_tags(id, move |tags| {
            tags.insert(tag);
        })
        .await
    }

    /// Remove a tag; removing one that is not present is a successful no-op
    ///
    /// Returns false only when no entry has this id.
    pub async fn remove_tag(&self, id: i64, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_string();
        self.edit_tags(id, move |tags| {
            tags.remove(&tag);
        })
        .await
    }

    async fn edit_tags<F>(&self, id: i64, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeSet<String>) + Send + 'static,
    {
        self.db
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let tags: Option<String> =
                        sqlx::query_scalar("SELECT tags FROM saved_components WHERE id = ?")
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await?;

                    let Some(tags) = tags else {
                        return Ok::<_, Error>(false);
                    };

                    let mut tags = parse_tags(&tags)?;
                    let before = tags.clone();
                    edit(&mut tags);

                    if tags != before {
                        sqlx::query(
                            "UPDATE saved_components SET tags = ?, updated_at = ? WHERE id = ?",
                        )
                        .bind(serde_json::to_string(&tags)?)
                        .bind(to_millis(now()))
                        .bind(id)
                        .execute(&mut *conn)
                        .await?;
                    }
                    Ok(true)
                })
            })
            .await
    }

    /// Replace the notes; `None` or blank clears them
    pub async fn update_notes(&self, id: i64, notes: Option<&str>) -> Result<bool> {
        let affected = self
            .db
            .execute(
                sqlx::query("UPDATE saved_components SET notes = ?, updated_at = ? WHERE id = ?")
                    .bind(notes.and_then(normalize_notes))
                    .bind(to_millis(now()))
                    .bind(id),
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn get_by_tag(&self, tag: &str) -> Result<Vec<SavedComponent>> {
        let sql = format!(
            r#"{SELECT_SAVED}
            WHERE EXISTS (SELECT 1 FROM json_each(saved_components.tags) WHERE value = ?)
            {NEWEST_FIRST}"#
        );

        let rows: Vec<SavedRow> = self
            .db
            .query_many(sqlx::query_as(&sql).bind(tag.trim()))
            .await?;

        rows.into_iter().map(SavedRow::into_saved).collect()
    }

    pub async fn get_by_category(&self, category: ComponentCategory) -> Result<Vec<SavedComponent>> {
        let sql = format!("{SELECT_SAVED} WHERE category = ? {NEWEST_FIRST}");

        let rows: Vec<SavedRow> = self
            .db
            .query_many(sqlx::query_as(&sql).bind(category.as_str()))
            .await?;

        rows.into_iter().map(SavedRow::into_saved).collect()
    }

    /// Entries whose part number, manufacturer or notes contain `text`
    pub async fn search(&self, text: &str) -> Result<Vec<SavedComponent>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = contains_pattern(text);

        let sql = format!(
            r#"{SELECT_SAVED}
            WHERE part_number LIKE ? ESCAPE '\'
               OR manufacturer LIKE ? ESCAPE '\'
               OR notes LIKE ? ESCAPE '\'
            {NEWEST_FIRST}"#
        );

        let rows: Vec<SavedRow> = self
            .db
            .query_many(
                sqlx::query_as(&sql)
                    .bind(&pattern)
                    .bind(&pattern)
                    .bind(&pattern),
            )
            .await?;

        rows.into_iter().map(SavedRow::into_saved).collect()
    }

    /// Entry for a natural key, if saved
    pub async fn get_by_key(
        &self,
        part_number: &str,
        manufacturer: &str,
    ) -> Result<Option<SavedComponent>> {
        let sql = format!("{SELECT_SAVED} WHERE part_number = ? AND manufacturer = ?");
        let row: Option<SavedRow> = self
            .db
            .query_one(
                sqlx::query_as(&sql)
                    .bind(part_number.trim())
                    .bind(manufacturer.trim()),
            )
            .await?;

        row.map(SavedRow::into_saved).transpose()
    }

    pub async fn is_saved(&self, part_number: &str, manufacturer: &str) -> Result<bool> {
        let count: i64 = self
            .db
            .query_scalar(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM saved_components WHERE part_number = ? AND manufacturer = ?",
                )
                .bind(part_number.trim())
                .bind(manufacturer.trim()),
            )
            .await?;

        Ok(count > 0)
    }

    /// Every tag in use, sorted and deduplicated
    pub async fn get_all_tags(&self) -> Result<Vec<String>> {
        self.db
            .query_many(sqlx::query_as::<_, (String,)>(
                r#"
                SELECT DISTINCT tag.value
                FROM saved_components, json_each(saved_components.tags) AS tag
                ORDER BY tag.value
                "#,
            ))
            .await
            .map(|rows| rows.into_iter().map(|(tag,)| tag).collect())
    }

    pub async fn remove(&self, id: i64) -> Result<bool> {
        let affected = self
            .db
            .execute(sqlx::query("DELETE FROM saved_components WHERE id = ?").bind(id))
            .await?;

        Ok(affected > 0)
    }

    pub async fn remove_by_part_number(&self, part_number: &str, manufacturer: &str) -> Result<bool> {
        let affected = self
            .db
            .execute(
                sqlx::query("DELETE FROM saved_components WHERE part_number = ? AND manufacturer = ?")
                    .bind(part_number.trim())
                    .bind(manufacturer.trim()),
            )
            .await?;

        Ok(affected > 0)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.db.execute(sqlx::query("DELETE FROM saved_components")).await?;
        info!(removed, "Cleared saved components");
        Ok(removed)
    }
}

async fn fetch_by_key(
    conn: &mut SqliteConnection,
    part_number: &str,
    manufacturer: &str,
) -> Result<Option<SavedComponent>> {
    let sql = format!("{SELECT_SAVED} WHERE part_number = ? AND manufacturer = ?");
    let row: Option<SavedRow> = sqlx::query_as(&sql)
        .bind(part_number)
        .bind(manufacturer)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(SavedRow::into_saved).transpose()
}

/// Insert a new entry or update the existing one, returning it with its id
async fn write(conn: &mut SqliteConnection, mut saved: SavedComponent) -> Result<SavedComponent> {
    let specs = serde_json::to_string(&saved.specs)?;
    let tags = serde_json::to_string(&saved.tags)?;

    if saved.id == 0 {
        let result = sqlx::query(
            r#"
            INSERT INTO saved_components (
                part_number, manufacturer, category, specs, notes, tags, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&saved.part_number)
        .bind(&saved.manufacturer)
        .bind(saved.category.as_str())
        .bind(specs)
        .bind(&saved.notes)
        .bind(tags)
        .bind(to_millis(saved.created_at))
        .bind(to_millis(saved.updated_at))
        .execute(&mut *conn)
        .await?;

        saved.id = result.last_insert_rowid();
    } else {
        sqlx::query(
            r#"
            UPDATE saved_components
            SET category = ?, specs = ?, notes = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(saved.category.as_str())
        .bind(specs)
        .bind(&saved.notes)
        .bind(tags)
        .bind(to_millis(saved.updated_at))
        .bind(saved.id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(saved)
}

fn parse_tags(json: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(json).map_err(|e| Error::Parse(format!("Invalid tags JSON: {}", e)))
}

#[derive(sqlx::FromRow)]
struct SavedRow {
    id: i64,
    part_number: String,
    manufacturer: String,
    category: String,
    specs: String,
    notes: Option<String>,
    tags: String,
    created_at: i64,
    updated_at: i64,
}

impl SavedRow {
    fn into_saved(self) -> Result<SavedComponent> {
        Ok(SavedComponent {
            id: self.id,
            part_number: self.part_number,
            manufacturer: self.manufacturer,
            category: ComponentCategory::parse_stored(&self.category)?,
            specs: serde_json::from_str(&self.specs)
                .map_err(|e| Error::Parse(format!("Invalid specs JSON: {}", e)))?,
            notes: self.notes,
            tags: parse_tags(&self.tags)?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}
