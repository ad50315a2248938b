//! Error types for walklog-types.

use thiserror::Error;

/// Errors raised while parsing or validating walklog data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A photo direction string was not one of `left`, `up` or `right`.
    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    /// A waypoint would move the track backwards in time.
    #[error("Waypoint at {next} is earlier than the previous waypoint at {previous}")]
    OutOfOrder {
        /// Timestamp of the last waypoint already in the track.
        previous: time::OffsetDateTime,
        /// Timestamp of the rejected waypoint.
        next: time::OffsetDateTime,
    },
}

/// Result type alias using walklog-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
