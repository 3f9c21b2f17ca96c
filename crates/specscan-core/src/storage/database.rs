//! SQLite database operations
//!
//! `Database` owns the single connection handle for the process. The handle is
//! opened and migrated lazily on first use, behind a lock, so concurrent first
//! callers never run migrations twice or read before migrations finish.
//!
//! Clones share the same handle. Construct one `Database` at startup and hand
//! clones to the repositories that need it.

use crate::error::{Error, Result};
use crate::storage::migrations::{self, MigrationStatus};
use futures_util::future::BoxFuture;
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MEMORY_PATH: &str = ":memory:";

/// Default time to wait for a locked database before failing
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database configuration options
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Whether to run migrations when the handle is opened
    pub auto_migrate: bool,
    /// Journal mode (default: WAL)
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode (default: NORMAL, durable under WAL)
    pub synchronous: SqliteSynchronous,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            auto_migrate: true,
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database config with the specified path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a config for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self::with_path(MEMORY_PATH)
    }

    /// Set the busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Disable automatic migrations
    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// Get the default database path
pub fn default_database_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("specscan").join("specscan.db")
    } else {
        PathBuf::from("specscan.db")
    }
}

/// Shared owner of the single database handle
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: DatabaseConfig,
    pool: RwLock<Option<SqlitePool>>,
    connects: AtomicU64,
}

impl Database {
    /// Create a database handle owner; nothing is opened until first use
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pool: RwLock::new(None),
                connects: AtomicU64::new(0),
            }),
        }
    }

    /// Create and open a database immediately, running migrations
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let db = Self::new(config);
        db.pool().await?;
        Ok(db)
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self::new(DatabaseConfig::in_memory())
    }

    /// Get the database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    /// Whether the handle is currently open
    pub async fn is_open(&self) -> bool {
        self.inner.pool.read().await.is_some()
    }

    /// How many times the handle has been opened over this value's lifetime
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Get the connection pool, opening and migrating it on first use
    pub async fn pool(&self) -> Result<SqlitePool> {
        {
            let guard = self.inner.pool.read().await;
            if let Some(pool) = guard.as_ref() {
                return Ok(pool.clone());
            }
        }

        let mut guard = self.inner.pool.write().await;
        // Another caller may have opened it while we waited for the write lock
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self.connect().await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Open the pool and migrate it
    ///
    /// Boxed so that callers of `pool()` stay `Send` across every borrow the
    /// migration run takes.
    fn connect(&self) -> BoxFuture<'_, Result<SqlitePool>> {
        Box::pin(async move {
            let config = &self.inner.config;

            let options = if config.is_memory() {
                SqliteConnectOptions::from_str("sqlite::memory:")?
            } else {
                if let Some(parent) = config.path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
                SqliteConnectOptions::new().filename(&config.path)
            };

            let options = options
                .create_if_missing(true)
                .journal_mode(config.journal_mode)
                .synchronous(config.synchronous)
                .foreign_keys(true)
                .busy_timeout(config.busy_timeout);

            // One connection is the single writer; it lives as long as the process.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?;

            if config.auto_migrate {
                if let Err(err) = migrations::run_migrations(&pool).await {
                    pool.close().await;
                    return Err(err);
                }
            }

            let count = self.inner.connects.fetch_add(1, Ordering::SeqCst) + 1;
            info!(path = %config.path.display(), connects = count, "Database opened");

            Ok(pool)
        })
    }

    /// Execute a statement, returning the number of affected rows
    pub async fn execute<'q>(&self, query: Query<'q, Sqlite, SqliteArguments<'q>>) -> Result<u64> {
        let pool = self.pool().await?;
        let result = query.execute(&pool).await?;
        Ok(result.rows_affected())
    }

    /// Fetch every row of a query
    pub async fn query_many<'q, T>(
        &self,
        query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
    ) -> Result<Vec<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
    {
        let pool = self.pool().await?;
        Ok(query.fetch_all(&pool).await?)
    }

    /// Fetch the first row of a query, if any
    pub async fn query_one<'q, T>(
        &self,
        query: QueryAs<'q, Sqlite, T, SqliteArguments<'q>>,
    ) -> Result<Option<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
    {
        let pool = self.pool().await?;
        Ok(query.fetch_optional(&pool).await?)
    }

    /// Fetch a single value, e.g. an aggregate
    pub async fn query_scalar<'q, T>(
        &self,
        query: QueryScalar<'q, Sqlite, T, SqliteArguments<'q>>,
    ) -> Result<T>
    where
        T: Send + Unpin,
        (T,): Send + Unpin + for<'r> FromRow<'r, SqliteRow>,
    {
        let pool = self.pool().await?;
        Ok(query.fetch_one(&pool).await?)
    }

    /// Run a unit of work in one transaction
    ///
    /// Commits when the unit returns `Ok`, rolls back when it returns `Err`.
    /// Nested calls are not supported: the handle is held for the whole unit,
    /// so calling back into `Database` from inside the unit waits on itself.
    /// Use the connection passed to the unit instead.
    pub fn with_transaction<'a, T, F>(&'a self, unit_of_work: F) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send + 'a,
    {
        Box::pin(async move {
            let pool = self.pool().await?;
            let mut tx = pool.begin().await?;

            match unit_of_work(&mut *tx).await {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Transaction rollback failed");
                    }
                    debug!(error = %err, "Transaction rolled back");
                    Err(err)
                }
            }
        })
    }

    /// Check migration status
    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        let pool = self.pool().await?;
        migrations::migration_status(&pool).await
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        let pool = self.pool().await?;
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await?;
        if one != 1 {
            return Err(Error::Other("Database health check failed".to_string()));
        }
        Ok(())
    }

    /// Close the handle; the next operation reopens it
    pub async fn close(&self) {
        let mut guard = self.inner.pool.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
            info!(path = %self.path().display(), "Database closed");
        }
    }

    /// Delete the store and recreate it at the current schema version
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.inner.pool.write().await;
        if let Some(pool) = guard.take() {
            pool.close().await;
        }

        if !self.inner.config.is_memory() {
            for path in store_files(&self.inner.config.path) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "Removed database file"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        let pool = self.connect().await?;
        *guard = Some(pool);

        info!(path = %self.path().display(), "Database reset");
        Ok(())
    }
}

/// The database file and its WAL companions
fn store_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}
