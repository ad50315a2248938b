//! Error types for walklog-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Store`] with a busy database | Retry with backoff | Another connection is finishing up |
//! | [`Error::StoreUnavailable`] | Do not retry | Reopen already failed once |
//! | [`Error::Position`] | Do not retry | Permission or hardware problem, report it |
//! | [`Error::Remote`] | User re-triggers | Export and import are never retried automatically |
//! | [`Error::NameExhausted`] | Do not retry | Pick a different export name |
//! | [`Error::NoSession`] / [`Error::ExportDisabled`] | Do not retry | Start a recording first |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! Only destructive local operations (the wipe before a fresh session or an
//! import) go through [`crate::with_retry`]. Incremental writes during
//! recording are never retried in place; the next accepted fix rewrites the
//! whole track anyway.

use thiserror::Error;

use crate::position::PositionError;
use crate::remote::RemoteError;

/// Errors that can occur in the recording and sync engines.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Local storage failed.
    #[error("Storage error: {0}")]
    Store(#[from] walklog_store::Error),

    /// Local storage could not be reached even after reopening it.
    #[error("Local storage is unavailable: {0}")]
    StoreUnavailable(#[source] walklog_store::Error),

    /// The position provider failed.
    #[error(transparent)]
    Position(#[from] PositionError),

    /// The remote store failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No recording was started in this process, so there is nothing to export.
    #[error("No tracking data. Start a recording first")]
    NoSession,

    /// The local data came from an import and is already on the remote.
    #[error("Export is disabled until a new recording starts")]
    ExportDisabled,

    /// Every candidate export name is already taken.
    #[error("No free export name for '{base}' after {attempts} attempts")]
    NameExhausted { base: String, attempts: u32 },

    /// The operation cannot run while recording.
    #[error("A recording is already in progress")]
    AlreadyRecording,

    /// The operation requires an active recording.
    #[error("Not recording")]
    NotRecording,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(e) => e.is_busy(),
            Error::Remote(e) => e.is_transient(),
            Error::Io(_) => true,
            Error::StoreUnavailable(_)
            | Error::Position(_)
            | Error::NoSession
            | Error::ExportDisabled
            | Error::NameExhausted { .. }
            | Error::AlreadyRecording
            | Error::NotRecording
            | Error::InvalidConfig(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Result type alias using walklog-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
