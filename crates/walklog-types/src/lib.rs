//! Shared types for the walklog GPS recorder.
//!
//! This crate holds the data model used by the store, the recording engine
//! and the sync engine, plus the spherical geodesy helpers the sampler
//! depends on. It has no I/O.
//!
//! # Example
//!
//! ```
//! use time::OffsetDateTime;
//! use walklog_types::{Fix, Track, Waypoint};
//!
//! let fix = Fix::new(34.8536671, 135.4720419, 4.56, OffsetDateTime::UNIX_EPOCH);
//! let mut track = Track::new("1970-01-01T00:00");
//! track.push(Waypoint::from_fix(&fix)).unwrap();
//! assert_eq!(track.total_points(), 1);
//! assert_eq!(track.points()[0].lat, 34.85367);
//! ```

pub mod error;
pub mod geo;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use geo::{GeoPoint, bearing, estimate_heading, haversine_distance};
pub use types::{
    DEFAULT_LAT, DEFAULT_LNG, DEFAULT_ZOOM, Direction, Fix, LastPosition, Photo, Track, TrackStats,
    Waypoint,
};
