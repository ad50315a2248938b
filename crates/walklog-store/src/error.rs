//! Error types for walklog-store.

use std::path::PathBuf;

use rusqlite::ErrorCode;

/// Result type for walklog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in walklog-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Another connection holds a lock the operation needs.
    #[error("Database is in use by another connection (close other walklog instances and retry): {0}")]
    Busy(rusqlite::Error),

    /// The connection was closed and has not been reopened.
    #[error("Database connection is closed")]
    Closed,

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Track not found in database.
    #[error("Track not found: {0}")]
    TrackNotFound(i64),

    /// Photo not found in database.
    #[error("Photo not found: {0}")]
    PhotoNotFound(i64),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates a model invariant.
    #[error("Invalid stored data: {0}")]
    InvalidData(#[from] walklog_types::ParseError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure was lock contention that may clear on its own.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::Busy(err),
            _ => Error::Database(err),
        }
    }
}
