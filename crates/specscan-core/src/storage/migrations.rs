//! Database migrations
//!
//! This module manages SQLite schema migrations for specscan.
//! Migrations are versioned and applied automatically on first database access.
//!
//! Each version is applied as one transaction together with its entry in the
//! `_migrations` table, so a failed version leaves the store at the previous
//! version and is retried on the next startup.

use crate::error::{Error, Result};
use futures_util::future::BoxFuture;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Current schema version
pub const CURRENT_VERSION: i64 = 4;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        description TEXT NOT NULL,
        applied_at INTEGER NOT NULL
    );
"#;

/// A single schema version: every statement runs in one transaction
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Migration 1: Component spec cache
const V1_COMPONENT_CACHE: &str = r#"
    CREATE TABLE IF NOT EXISTS component_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        part_number TEXT NOT NULL,
        manufacturer TEXT NOT NULL,
        category TEXT NOT NULL,
        specs TEXT NOT NULL,                -- JSON object of spec name -> value
        source_type TEXT NOT NULL,
        source_url TEXT,
        source_confidence REAL NOT NULL DEFAULT 0.0,
        retrieved_at INTEGER NOT NULL,
        datasheet_url TEXT,
        created_at INTEGER NOT NULL,        -- unix millis
        updated_at INTEGER NOT NULL,
        expires_at INTEGER,
        UNIQUE(part_number, manufacturer)
    );

    CREATE INDEX IF NOT EXISTS idx_component_cache_part_number ON component_cache(part_number);
    CREATE INDEX IF NOT EXISTS idx_component_cache_category ON component_cache(category);
    CREATE INDEX IF NOT EXISTS idx_component_cache_expires_at ON component_cache(expires_at);
"#;

/// Migration 2: Datasheet cache keyed by source URL
const V2_DATASHEET_CACHE: &str = r#"
    CREATE TABLE IF NOT EXISTS datasheet_cache (
        url TEXT PRIMARY KEY NOT NULL,
        part_number TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        parsed_specs TEXT,
        raw_text TEXT,
        page_count INTEGER,
        file_size INTEGER,
        created_at INTEGER NOT NULL,
        expires_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_datasheet_cache_part_number ON datasheet_cache(part_number);
    CREATE INDEX IF NOT EXISTS idx_datasheet_cache_expires_at ON datasheet_cache(expires_at);
"#;

/// Migration 3: Scan history and detected components
const V3_SCAN_HISTORY: &str = r#"
    CREATE TABLE IF NOT EXISTS scan_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        claim_raw TEXT NOT NULL,
        claim_value REAL,
        claim_unit TEXT,
        claim_type TEXT,
        verdict_type TEXT NOT NULL CHECK (verdict_type IN ('plausible', 'questionable', 'implausible', 'unknown')),
        verdict TEXT NOT NULL,              -- serialized verdict payload
        component_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_scan_history_created_at ON scan_history(created_at);
    CREATE INDEX IF NOT EXISTS idx_scan_history_verdict_type ON scan_history(verdict_type);
"#;

const V3_SCAN_COMPONENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS scan_components (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id INTEGER NOT NULL REFERENCES scan_history(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        part_number TEXT NOT NULL,
        manufacturer TEXT NOT NULL,
        category TEXT NOT NULL,
        bounding_box TEXT,
        confidence REAL NOT NULL DEFAULT 0.0
    );

    CREATE INDEX IF NOT EXISTS idx_scan_components_scan_id ON scan_components(scan_id);
    CREATE INDEX IF NOT EXISTS idx_scan_components_part_number ON scan_components(part_number);
"#;

/// Migration 4: User-curated saved components
const V4_SAVED_COMPONENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS saved_components (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        part_number TEXT NOT NULL,
        manufacturer TEXT NOT NULL,
        category TEXT NOT NULL,
        specs TEXT NOT NULL,
        notes TEXT,
        tags TEXT NOT NULL DEFAULT '[]',    -- JSON array, sorted and deduplicated
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(part_number, manufacturer)
    );

    CREATE INDEX IF NOT EXISTS idx_saved_components_category ON saved_components(category);
    CREATE INDEX IF NOT EXISTS idx_saved_components_created_at ON saved_components(created_at);
"#;

/// All registered migrations, in ascending version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Component spec cache",
        statements: &[V1_COMPONENT_CACHE],
    },
    Migration {
        version: 2,
        description: "Datasheet cache",
        statements: &[V2_DATASHEET_CACHE],
    },
    Migration {
        version: 3,
        description: "Scan history",
        statements: &[V3_SCAN_HISTORY, V3_SCAN_COMPONENTS],
    },
    Migration {
        version: 4,
        description: "Saved components",
        statements: &[V4_SAVED_COMPONENTS],
    },
];

/// Get the current schema version from the database
///
/// A database without the `_migrations` table is at version 0.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_migrations'",
    )
    .fetch_one(pool)
    .await?;

    if exists == 0 {
        return Ok(0);
    }

    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version)
}

fn validate_order(migrations: &[Migration]) -> Result<()> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            return Err(Error::ConfigError(format!(
                "migration v{} is registered after v{}; versions must be strictly increasing",
                migration.version, previous
            )));
        }
        previous = migration.version;
    }
    Ok(())
}

/// Run raw SQL on a connection through `Executor::execute`
///
/// Works around a compiler limitation where the `raw_sql` execute future is
/// not provably `Send` for every lifetime when awaited inside a boxed future.
fn execute_raw<'c>(
    conn: &'c mut sqlx::SqliteConnection,
    sql: &'static str,
) -> BoxFuture<'c, std::result::Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>> {
    sqlx::Executor::execute(conn, sqlx::raw_sql(sql))
}

/// Apply one version and record it, all in a single transaction
///
/// Boxed so the returned future is `Send` for any pool borrow, which keeps
/// `Database::pool` usable from spawned tasks.
fn apply(pool: &SqlitePool, migration: Migration) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let version = migration.version;
        let failed = move |e: sqlx::Error| Error::Migration {
            version,
            message: e.to_string(),
        };

        let mut tx = pool.begin().await.map_err(failed)?;

        execute_raw(&mut tx, CREATE_MIGRATIONS_TABLE)
            .await
            .map_err(failed)?;

        for &statement in migration.statements {
            execute_raw(&mut tx, statement)
                .await
                .map_err(failed)?;
        }

        sqlx::query("INSERT INTO _migrations (version, description, applied_at) VALUES (?, ?, ?)")
            .bind(version)
            .bind(migration.description)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        tx.commit().await.map_err(failed)?;
        Ok(())
    })
}

/// Bring the database up to `target` using the given migration list
///
/// Versions above the current one and at most `target` are applied in
/// increasing order. Versions without statements are skipped and not recorded.
/// Returns the schema version after the run.
pub fn migrate_to<'a>(
    pool: &'a SqlitePool,
    migrations: &'a [Migration],
    target: i64,
) -> BoxFuture<'a, Result<i64>> {
    Box::pin(async move {
        validate_order(migrations)?;

        let start = current_version(pool).await?;

        info!(
            current_version = start,
            target_version = target,
            "Checking database migrations"
        );

        if start >= target {
            debug!("Database is up to date");
            return Ok(start);
        }

        let pending: Vec<Migration> = migrations
            .iter()
            .filter(|m| m.version > start && m.version <= target)
            .copied()
            .collect();

        let mut current = start;
        for migration in pending {
            if migration.statements.is_empty() {
                debug!(version = migration.version, "Skipping migration with no statements");
                continue;
            }

            info!(
                version = migration.version,
                "Applying migration v{}: {}", migration.version, migration.description
            );
            apply(pool, migration).await?;
            current = migration.version;
        }

        info!(version = current, "Database migrations completed");
        Ok(current)
    })
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    migrate_to(pool, MIGRATIONS, CURRENT_VERSION).await?;
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> Result<MigrationStatus> {
    let current_version = current_version(pool).await?;
    let needs_migration = MIGRATIONS.iter().any(|m| {
        m.version > current_version && m.version <= CURRENT_VERSION && !m.statements.is_empty()
    });

    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration,
    })
}

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i64,
    /// Target schema version (latest)
    pub target_version: i64,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
