//! Recorder and sync event system.
//!
//! Everything a UI needs to render (position marker, status line, stats
//! panel, sync progress) is published as a [`RecorderEvent`] on a broadcast
//! channel. Sends never block and are dropped when nobody listens.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use walklog_store::DataStats;
use walklog_types::{GeoPoint, LastPosition, Waypoint};

use crate::position::PositionError;
use crate::sampler::RejectReason;

/// How a new session treats data already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// The store was empty.
    Fresh,
    /// Existing data was wiped first.
    Discarded,
    /// Existing data was kept and a new track added.
    Appended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    UploadingPhotos,
    WritingDocument,
    ClearingLocal,
    RestoringTracks,
    DownloadingPhotos,
}

/// Events emitted while recording and syncing.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RecorderEvent {
    RecordingStarted {
        start_label: String,
        track_id: Option<i64>,
        mode: StartMode,
    },
    /// A fix arrived, whether or not it was kept.
    PositionUpdated {
        lat: f64,
        lng: f64,
        accuracy: f64,
        heading: f64,
        /// Meters from the last accepted fix.
        distance_m: f64,
        /// Seconds since the last accepted fix.
        elapsed_secs: f64,
    },
    WaypointRecorded {
        waypoint: Waypoint,
        total_points: usize,
    },
    FixSkipped {
        reason: RejectReason,
        distance_m: f64,
        elapsed_secs: f64,
    },
    PositionError {
        error: PositionError,
    },
    HeadingChanged {
        heading: f64,
    },
    PhotoSaved {
        id: i64,
        photos_in_session: u32,
        location: Option<GeoPoint>,
    },
    RecordingStopped {
        total_points: usize,
        photos: u32,
    },
    StatsChanged {
        stats: DataStats,
    },
    DataCleared {
        kept: LastPosition,
    },
    SyncProgress {
        phase: SyncPhase,
        done: usize,
        total: usize,
    },
    /// Human-readable status line.
    Status {
        message: String,
    },
}

impl RecorderEvent {
    pub fn status(message: impl Into<String>) -> Self {
        RecorderEvent::Status {
            message: message.into(),
        }
    }
}

/// Sender for recorder events.
pub type EventSender = broadcast::Sender<RecorderEvent>;

/// Receiver for recorder events.
pub type EventReceiver = broadcast::Receiver<RecorderEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn send(&self, event: RecorderEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RecorderEvent::SyncProgress {
            phase: SyncPhase::UploadingPhotos,
            done: 3,
            total: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync_progress");
        assert_eq!(json["phase"], "uploading_photos");

        let back: RecorderEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, RecorderEvent::SyncProgress { done: 3, .. }));
    }

    #[test]
    fn test_status_event() {
        let json = serde_json::to_string(&RecorderEvent::status("Recording (3 points)")).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains("Recording (3 points)"));
    }

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(RecorderEvent::HeadingChanged { heading: 90.0 });

        assert!(matches!(a.recv().await.unwrap(), RecorderEvent::HeadingChanged { .. }));
        assert!(matches!(b.recv().await.unwrap(), RecorderEvent::HeadingChanged { .. }));
    }

    #[test]
    fn test_send_without_receivers() {
        EventDispatcher::default().send(RecorderEvent::status("nobody listening"));
    }
}
