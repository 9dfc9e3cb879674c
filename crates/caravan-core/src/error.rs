//! Error types for caravan-core

use thiserror::Error;

/// Result type alias using caravan-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in caravan-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Referential integrity or uniqueness violation
    #[error("Integrity error: {0}")]
    Integrity(String),
}

impl Error {
    /// Maps constraint failures (foreign key, unique) to `Integrity` so callers
    /// can surface them as rejections rather than opaque database errors. All
    /// other libSQL errors pass through unchanged.
    pub fn from_constraint(error: libsql::Error) -> Self {
        let message = error.to_string();
        if message.contains("constraint failed") {
            Self::Integrity(message)
        } else {
            Self::LibSql(error)
        }
    }
}
