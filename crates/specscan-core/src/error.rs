//! Error types for specscan

use thiserror::Error;

/// Result type alias using specscan's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Storage layer errors
///
/// "Not cached" is never an error: lookups return `Ok(None)` or an empty list.
#[derive(Error, Debug)]
pub enum Error {
    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration v{version} failed: {message}. The store was left at the previous version.")]
    Migration { version: i64, message: String },

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Stored data errors (E900-E999)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored data could not be read: {0}")]
    Parse(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E400",
            Self::Migration { .. } => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) => "E900",
            Self::Parse(_) => "E901",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Migration { .. } => Some("specscan doctor".to_string()),
            Self::Parse(_) => Some("specscan reset --yes".to_string()),
            Self::ConfigError(_) => Some("specscan config show".to_string()),
            _ => None,
        }
    }

    /// Whether the error came from the underlying store rather than the caller
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Migration { .. } | Self::Io(_)
        )
    }
}
