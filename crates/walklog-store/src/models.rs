//! Data models for stored data.

use serde::{Deserialize, Serialize};

use walklog_types::{Photo, Track, TrackStats};

/// A track row together with its database key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrack {
    /// Database row ID.
    pub id: i64,
    pub track: Track,
}

/// A photo row together with its database key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPhoto {
    /// Database row ID.
    pub id: i64,
    pub photo: Photo,
}

impl StoredPhoto {
    /// Whether the photo already has a remote copy.
    pub fn is_uploaded(&self) -> bool {
        self.photo.storage_path.is_some() || self.photo.remote_url.is_some()
    }
}

/// Size and count summary of everything in the local store.
///
/// Byte counts are the stored sizes: the JSON-encoded waypoint lists for
/// GPS data and the encoded images for photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataStats {
    pub track_count: usize,
    pub total_points: usize,
    pub gps_bytes: u64,
    pub photo_count: usize,
    pub photo_bytes: u64,
}

impl DataStats {
    /// Whether there is anything a fresh session would have to discard or append to.
    pub fn has_data(&self) -> bool {
        self.track_count > 0 || self.photo_count > 0
    }

    pub fn track_stats(&self) -> TrackStats {
        TrackStats {
            track_count: self.track_count,
            total_points: self.total_points,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.gps_bytes + self.photo_bytes
    }
}
