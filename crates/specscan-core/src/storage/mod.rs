//! Storage layer - SQLite connection management and migrations
//!
//! # Architecture
//!
//! - `database`: single-handle ownership, lazy initialization, transactions
//! - `migrations`: schema versioning and ordered migration
//!
//! # Usage
//!
//! ```ignore
//! use specscan_core::storage::{Database, DatabaseConfig};
//!
//! // In-memory database for tests
//! let db = Database::in_memory();
//!
//! // File-backed database, opened on first use
//! let db = Database::new(DatabaseConfig::with_path("specscan.db"));
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{
    CURRENT_VERSION, MIGRATIONS, Migration, MigrationStatus, migrate_to, migration_status,
    run_migrations,
};
