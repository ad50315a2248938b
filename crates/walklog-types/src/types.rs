//! Core data types for recorded walks.

use core::fmt;
use core::str::FromStr;

use bytes::Bytes;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};
use crate::geo::{GeoPoint, round_to};

/// Latitude of the fallback map position used when nothing was ever recorded.
pub const DEFAULT_LAT: f64 = 34.853667;
/// Longitude of the fallback map position.
pub const DEFAULT_LNG: f64 = 135.472041;
/// Zoom level of the fallback map position.
pub const DEFAULT_ZOOM: u8 = 13;

/// A raw reading from the position provider.
///
/// Coordinates are unrounded. `accuracy` is the provider's estimated
/// error radius in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    /// Direction of travel reported by the provider, in degrees.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub heading: Option<f64>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl Fix {
    /// Create a fix without a provider heading.
    #[must_use]
    pub fn new(lat: f64, lng: f64, accuracy: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            lat,
            lng,
            accuracy,
            heading: None,
            timestamp,
        }
    }

    /// Attach a provider heading.
    #[must_use]
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    #[must_use]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// An accepted, rounded position in a track.
///
/// Coordinates carry 5 decimal places and accuracy 1 decimal place.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub accuracy: f64,
}

impl Waypoint {
    /// Build the stored form of an accepted fix.
    #[must_use]
    pub fn from_fix(fix: &Fix) -> Self {
        Self {
            lat: fix.lat,
            lng: fix.lng,
            timestamp: fix.timestamp,
            accuracy: fix.accuracy,
        }
        .rounded()
    }

    /// Re-apply the canonical rounding.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_to(self.lat, 5),
            lng: round_to(self.lng, 5),
            timestamp: self.timestamp,
            accuracy: round_to(self.accuracy, 1),
        }
    }

    #[must_use]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// One recording run: a start label and its ordered waypoints.
///
/// The point count is always derived from `points`, so the serialized
/// `totalPoints` field can never disagree with the list. Waypoint
/// timestamps are non-decreasing; [`Track::push`] enforces this.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "TrackRecord", into = "TrackRecord")
)]
pub struct Track {
    start_timestamp: String,
    points: Vec<Waypoint>,
}

impl Track {
    /// Create an empty track labelled with its start time.
    #[must_use]
    pub fn new(start_timestamp: impl Into<String>) -> Self {
        Self {
            start_timestamp: start_timestamp.into(),
            points: Vec::new(),
        }
    }

    /// Create a track from existing points, rejecting out-of-order input.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutOfOrder`] if any waypoint is earlier than its predecessor.
    pub fn from_points(
        start_timestamp: impl Into<String>,
        points: impl IntoIterator<Item = Waypoint>,
    ) -> ParseResult<Self> {
        let mut track = Self::new(start_timestamp);
        for point in points {
            track.push(point)?;
        }
        Ok(track)
    }

    /// Append a waypoint.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutOfOrder`] if `waypoint` is earlier than the last point.
    pub fn push(&mut self, waypoint: Waypoint) -> ParseResult<()> {
        if let Some(last) = self.points.last()
            && waypoint.timestamp < last.timestamp
        {
            return Err(ParseError::OutOfOrder {
                previous: last.timestamp,
                next: waypoint.timestamp,
            });
        }
        self.points.push(waypoint);
        Ok(())
    }

    #[must_use]
    pub fn start_timestamp(&self) -> &str {
        &self.start_timestamp
    }

    #[must_use]
    pub fn points(&self) -> &[Waypoint] {
        &self.points
    }

    #[must_use]
    pub fn total_points(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Waypoint> {
        self.points.last()
    }

    /// Copy of this track with every waypoint re-rounded.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            start_timestamp: self.start_timestamp.clone(),
            points: self.points.iter().map(Waypoint::rounded).collect(),
        }
    }
}

/// Wire shape of a [`Track`].
///
/// `totalPoints` is written for readers that want it without counting,
/// and ignored on input.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRecord {
    start_timestamp: String,
    #[serde(default)]
    points: Vec<Waypoint>,
    #[serde(default)]
    total_points: usize,
}

#[cfg(feature = "serde")]
impl From<Track> for TrackRecord {
    fn from(track: Track) -> Self {
        Self {
            total_points: track.points.len(),
            start_timestamp: track.start_timestamp,
            points: track.points,
        }
    }
}

#[cfg(feature = "serde")]
impl From<TrackRecord> for Track {
    fn from(record: TrackRecord) -> Self {
        let mut points = record.points;
        // Imported data is untrusted; keep the ordering guarantee.
        points.sort_by_key(|p| p.timestamp);
        Self {
            start_timestamp: record.start_timestamp,
            points,
        }
    }
}

/// Which way the camera pointed relative to the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    Left,
    Up,
    Right,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Up => "up",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Direction::Left),
            "up" => Ok(Direction::Up),
            "right" => Ok(Direction::Right),
            _ => Err(ParseError::UnknownDirection(s.to_string())),
        }
    }
}

/// A captured photo with its placement metadata.
///
/// `data` holds the encoded JPEG. `remote_url` and `storage_path` are set
/// once the photo has been uploaded or when it was restored from a remote
/// document.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Photo {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Bytes,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub direction: Option<Direction>,
    pub location: Option<GeoPoint>,
    /// Travel heading at capture time, in degrees.
    pub heading: Option<f64>,
    pub text: Option<String>,
    pub remote_url: Option<String>,
    pub storage_path: Option<String>,
}

impl Photo {
    /// A photo that has not been uploaded anywhere yet.
    #[must_use]
    pub fn new(data: Bytes, timestamp: OffsetDateTime) -> Self {
        Self {
            data,
            timestamp,
            direction: None,
            location: None,
            heading: None,
            text: None,
            remote_url: None,
            storage_path: None,
        }
    }

    /// Size of the encoded image in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The map view persisted across sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LastPosition {
    pub lat: f64,
    pub lng: f64,
    pub zoom: u8,
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub timestamp: Option<OffsetDateTime>,
}

impl LastPosition {
    /// A position rounded to 5 decimal places and stamped with `timestamp`.
    #[must_use]
    pub fn new(point: GeoPoint, zoom: u8, timestamp: OffsetDateTime) -> Self {
        let point = point.rounded();
        Self {
            lat: point.lat,
            lng: point.lng,
            zoom,
            timestamp: Some(timestamp),
        }
    }

    #[must_use]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl Default for LastPosition {
    fn default() -> Self {
        Self {
            lat: DEFAULT_LAT,
            lng: DEFAULT_LNG,
            zoom: DEFAULT_ZOOM,
            timestamp: None,
        }
    }
}

/// Aggregate counts over a set of tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackStats {
    pub track_count: usize,
    pub total_points: usize,
}

impl TrackStats {
    #[must_use]
    pub fn from_tracks<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> Self {
        tracks
            .into_iter()
            .fold(Self::default(), |acc, track| Self {
                track_count: acc.track_count + 1,
                total_points: acc.total_points + track.total_points(),
            })
    }
}
