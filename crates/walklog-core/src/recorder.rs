//! The recording session state machine.
//!
//! [`Recorder`] owns the in-memory trail and drives it through
//! `Idle → Recording → Stopped`. Every fix goes through the [`Sampler`];
//! accepted fixes are appended to the trail first and written to the store
//! afterwards, so the trail in memory is authoritative while recording and
//! a failed write only delays persistence until the next accepted fix.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use walklog_core::{ChannelSource, FixedPrompt, Recorder, RecorderConfig, UnsupportedWakeLock};
//! use walklog_store::Store;
//! use walklog_types::Fix;
//!
//! # async fn example() -> Result<(), walklog_core::Error> {
//! let source = ChannelSource::new();
//! let feed = source.feed();
//! let store = walklog_core::persistence::shared(Store::open_in_memory()?);
//! let mut recorder = Recorder::new(
//!     store,
//!     Arc::new(source),
//!     Arc::new(UnsupportedWakeLock),
//!     RecorderConfig::default(),
//! )?;
//!
//! recorder.start(&mut FixedPrompt::default()).await?;
//! feed.send_fix(Fix::new(35.0, 135.0, 5.0, time::OffsetDateTime::now_utc())).await;
//! recorder.pump().await;
//! let summary = recorder.stop().await;
//! assert_eq!(summary.map(|s| s.total_points), Some(1));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use walklog_types::{Direction, Fix, GeoPoint, LastPosition, Photo, Track, Waypoint};

use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, RecorderEvent, StartMode};
use crate::persistence::{self, SharedStore};
use crate::position::{PositionError, PositionSource, PositionSubscription, SubscribeOptions};
use crate::power::{CompassReading, HeadingSource, HeadingTracker, PowerCoordinator, WakeLock};
use crate::prompt::{Prompt, StartDecision};
use crate::retry::RetryConfig;
use crate::sampler::{AcceptReason, Anchor, Decision, RejectReason, Sampler, SamplerConfig};

/// Format a session start time as `yyyy-MM-ddThh:mm`.
pub fn format_start_label(time: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}",
        time.year(),
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute()
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub sampler: SamplerConfig,
    pub subscribe: SubscribeOptions,
    /// Kept by a wipe when no position was ever saved, and the initial map view.
    pub default_position: LastPosition,
    pub wipe_retry: RetryConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            subscribe: SubscribeOptions::default(),
            default_position: LastPosition::default(),
            wipe_retry: RetryConfig::for_wipe(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        self.subscribe.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Recording,
    /// Idle again after a recording. Only distinguished for display.
    Stopped,
}

/// Everything the recorder knows about the current session.
#[derive(Debug, Clone)]
pub struct RecorderState {
    phase: Phase,
    track: Track,
    track_id: Option<i64>,
    last_accepted: Option<Anchor>,
    start_label: Option<String>,
    imported: bool,
    photos_in_session: u32,
    current: Option<Fix>,
    heading: HeadingTracker,
    zoom: u8,
}

impl RecorderState {
    pub fn new(zoom: u8) -> Self {
        Self {
            phase: Phase::Idle,
            track: Track::default(),
            track_id: None,
            last_accepted: None,
            start_label: None,
            imported: false,
            photos_in_session: 0,
            current: None,
            heading: HeadingTracker::default(),
            zoom,
        }
    }

    /// State for exporting a session recorded by an earlier process.
    pub fn with_stored_session(start_label: impl Into<String>, zoom: u8) -> Self {
        Self {
            phase: Phase::Stopped,
            start_label: Some(start_label.into()),
            ..Self::new(zoom)
        }
    }

    /// State for local data that was imported by an earlier process.
    pub fn imported(zoom: u8) -> Self {
        let mut state = Self::new(zoom);
        state.mark_imported();
        state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }

    /// The trail of the current or most recent session.
    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn track_id(&self) -> Option<i64> {
        self.track_id
    }

    pub fn start_label(&self) -> Option<&str> {
        self.start_label.as_deref()
    }

    pub fn photos_in_session(&self) -> u32 {
        self.photos_in_session
    }

    /// Latest fix, accepted or not.
    pub fn current_fix(&self) -> Option<&Fix> {
        self.current.as_ref()
    }

    pub fn heading(&self) -> f64 {
        self.heading.current()
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    pub fn export_enabled(&self) -> bool {
        self.start_label.is_some()
    }

    /// The default export name, or why exporting is not possible.
    pub fn export_basis(&self) -> Result<&str> {
        match &self.start_label {
            Some(label) => Ok(label),
            None if self.imported => Err(Error::ExportDisabled),
            None => Err(Error::NoSession),
        }
    }

    fn begin(&mut self, now: OffsetDateTime) {
        self.phase = Phase::Recording;
        self.track = Track::new(format_start_label(now));
        self.track_id = None;
        self.last_accepted = None;
        self.start_label = Some(self.track.start_timestamp().to_string());
        self.imported = false;
        self.photos_in_session = 0;
    }

    /// Local data now mirrors a remote document; it must not be exported again.
    pub(crate) fn mark_imported(&mut self) {
        self.phase = Phase::Idle;
        self.track = Track::default();
        self.track_id = None;
        self.last_accepted = None;
        self.start_label = None;
        self.imported = true;
        self.photos_in_session = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        mode: StartMode,
        track_id: Option<i64>,
    },
    /// Already recording; nothing changed.
    AlreadyRecording,
    /// The user backed out of the discard/append question.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Accepted {
        reason: AcceptReason,
        total_points: usize,
        persisted: bool,
    },
    Rejected(RejectReason),
    /// Not recording; only the current position was updated.
    Ignored,
    Failed(PositionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopSummary {
    pub track_id: Option<i64>,
    pub total_points: usize,
    pub photos: u32,
    /// Saved position, if the trail was non-empty and the write succeeded.
    pub last_position: Option<LastPosition>,
    /// Whether the final track write succeeded.
    pub persisted: bool,
}

/// A still image handed over by the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub captured_at: OffsetDateTime,
}

impl CapturedImage {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            captured_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn captured_at(mut self, time: OffsetDateTime) -> Self {
        self.captured_at = time;
        self
    }
}

pub struct Recorder {
    store: SharedStore,
    source: Arc<dyn PositionSource>,
    power: PowerCoordinator,
    sampler: Sampler,
    config: RecorderConfig,
    state: RecorderState,
    events: EventDispatcher,
    subscription: Option<PositionSubscription>,
    stats_view_open: bool,
}

impl Recorder {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn PositionSource>,
        wake_lock: Arc<dyn WakeLock>,
        config: RecorderConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            source,
            power: PowerCoordinator::new(wake_lock),
            sampler: Sampler::new(config.sampler),
            state: RecorderState::new(config.default_position.zoom),
            config,
            events: EventDispatcher::default(),
            subscription: None,
            stats_view_open: false,
        })
    }

    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RecorderState {
        &mut self.state
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn wake_lock_held(&self) -> bool {
        self.power.is_held()
    }

    /// Where the map should open: the saved position or the configured default.
    pub async fn initial_view(&self) -> LastPosition {
        match self.store.lock().await.last_position() {
            Ok(Some(position)) => position,
            Ok(None) => self.config.default_position,
            Err(e) => {
                warn!("Failed to read last position: {}", e);
                self.config.default_position
            }
        }
    }

    /// Start a new session.
    ///
    /// Asks `prompt` whether to discard or append when the store holds
    /// data. Fails only if the store cannot be reached, the wipe fails, or
    /// the position source refuses the subscription; in the last case the
    /// recorder is back in its previous phase.
    pub async fn start<Q: Prompt + ?Sized>(&mut self, prompt: &mut Q) -> Result<StartOutcome> {
        if self.state.is_recording() {
            debug!("Start ignored, already recording");
            return Ok(StartOutcome::AlreadyRecording);
        }

        persistence::ensure_available(&self.store).await?;

        let existing = persistence::data_stats(&self.store).await?;
        let mode = if existing.has_data() {
            match prompt.start_decision(&existing).await {
                StartDecision::Cancel => {
                    info!("Start cancelled");
                    return Ok(StartOutcome::Cancelled);
                }
                StartDecision::Discard => {
                    let kept = persistence::wipe_local(
                        &self.store,
                        &self.config.default_position,
                        &self.config.wipe_retry,
                    )
                    .await?;
                    self.events.send(RecorderEvent::DataCleared { kept });
                    StartMode::Discarded
                }
                StartDecision::Append => StartMode::Appended,
            }
        } else {
            StartMode::Fresh
        };

        let previous = self.state.clone();
        self.state.begin(OffsetDateTime::now_utc());
        let label = self.state.track.start_timestamp().to_string();

        match self.store.lock().await.create_track(&label) {
            Ok(id) => self.state.track_id = Some(id),
            // the first accepted fix inserts the row instead
            Err(e) => warn!("Failed to create track for {}: {}", label, e),
        }

        self.power.acquire().await;

        match self.source.subscribe(&self.config.subscribe).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                warn!("Position subscription failed: {}", e);
                self.power.release().await;
                if let Some(id) = self.state.track_id {
                    if let Err(e) = self.store.lock().await.delete_track(id) {
                        warn!("Failed to remove empty track {}: {}", id, e);
                    }
                }
                self.state = previous;
                return Err(e);
            }
        }

        info!("Recording started ({}, {:?})", label, mode);
        self.events.send(RecorderEvent::RecordingStarted {
            start_label: label,
            track_id: self.state.track_id,
            mode,
        });
        self.events.send(RecorderEvent::status("Recording (0 points)"));
        self.refresh_stats().await;

        Ok(StartOutcome::Started {
            mode,
            track_id: self.state.track_id,
        })
    }

    /// Process one fix from the position source.
    pub async fn handle_fix(&mut self, fix: Fix) -> FixOutcome {
        if let Some(heading) = self.state.heading.update_from_fix(&fix) {
            self.events.send(RecorderEvent::HeadingChanged { heading });
        }

        let evaluation = self.sampler.evaluate(&fix, self.state.last_accepted.as_ref());
        self.state.current = Some(fix);
        self.events.send(RecorderEvent::PositionUpdated {
            lat: fix.lat,
            lng: fix.lng,
            accuracy: fix.accuracy,
            heading: self.state.heading.current(),
            distance_m: evaluation.distance_m,
            elapsed_secs: evaluation.elapsed_secs,
        });

        if !self.state.is_recording() {
            return FixOutcome::Ignored;
        }

        let reason = match evaluation.decision {
            Decision::Accept(reason) => reason,
            Decision::Reject(reason) => {
                debug!(
                    "Skip record: {:?}, elapsed {:.1}s, distance {:.1}m, accuracy {:.1}m",
                    reason, evaluation.elapsed_secs, evaluation.distance_m, fix.accuracy
                );
                self.events.send(RecorderEvent::FixSkipped {
                    reason,
                    distance_m: evaluation.distance_m,
                    elapsed_secs: evaluation.elapsed_secs,
                });
                return FixOutcome::Rejected(reason);
            }
        };

        let waypoint = Waypoint::from_fix(&fix);
        if let Err(e) = self.state.track.push(waypoint) {
            warn!("Dropping fix: {}", e);
            return FixOutcome::Rejected(RejectReason::TooSoon);
        }
        self.state.last_accepted = Some(Anchor::from(&fix));

        let total_points = self.state.track.total_points();
        debug!("Recorded point {} ({:?})", total_points, reason);
        self.events.send(RecorderEvent::WaypointRecorded {
            waypoint,
            total_points,
        });
        self.events
            .send(RecorderEvent::status(format!("Recording ({total_points} points)")));

        let persisted = self.persist_track().await;
        self.refresh_stats().await;

        FixOutcome::Accepted {
            reason,
            total_points,
            persisted,
        }
    }

    fn report_position_error(&self, error: &PositionError) {
        warn!("Position error: {}", error);
        self.events.send(RecorderEvent::PositionError {
            error: error.clone(),
        });
        self.events.send(RecorderEvent::status(error.to_string()));
    }

    /// Wait for and process the next subscription event.
    ///
    /// Returns `None` when not subscribed or once the subscription ended.
    pub async fn pump(&mut self) -> Option<FixOutcome> {
        let event = self.subscription.as_mut()?.next_event().await?;
        Some(match event {
            Ok(fix) => self.handle_fix(fix).await,
            Err(error) => {
                self.report_position_error(&error);
                FixOutcome::Failed(error)
            }
        })
    }

    /// Process events until `shutdown` fires or the source hangs up, then stop.
    pub async fn run_until(&mut self, shutdown: CancellationToken) -> Option<StopSummary> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.pump() => {
                    if outcome.is_none() {
                        break;
                    }
                }
            }
        }
        self.stop().await
    }

    /// Stop the session. Returns `None` if nothing was recording.
    pub async fn stop(&mut self) -> Option<StopSummary> {
        if !self.state.is_recording() {
            return None;
        }

        self.power.release().await;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.state.phase = Phase::Stopped;

        let mut summary = StopSummary {
            track_id: self.state.track_id,
            total_points: self.state.track.total_points(),
            photos: self.state.photos_in_session,
            last_position: None,
            persisted: true,
        };

        if let Some(last) = self.state.track.last().copied() {
            let position =
                LastPosition::new(last.point(), self.state.zoom, OffsetDateTime::now_utc());
            match self.store.lock().await.save_last_position(&position) {
                Ok(()) => summary.last_position = Some(position),
                Err(e) => warn!("Failed to save last position: {}", e),
            }
            summary.persisted = self.persist_track().await;
            summary.track_id = self.state.track_id;
        } else if let Some(id) = self.state.track_id.take() {
            // nothing was accepted; drop the row created at start
            match self.store.lock().await.delete_track(id) {
                Ok(()) => debug!("Removed empty track {}", id),
                Err(e) => warn!("Failed to remove empty track {}: {}", id, e),
            }
            summary.track_id = None;
        }

        info!(
            "Recording stopped: {} points, {} photos",
            summary.total_points, summary.photos
        );
        self.events.send(RecorderEvent::RecordingStopped {
            total_points: summary.total_points,
            photos: summary.photos,
        });
        self.events.send(RecorderEvent::status(format!(
            "Stopped ({} points)",
            summary.total_points
        )));
        self.refresh_stats().await;

        Some(summary)
    }

    /// Store a photo taken during the recording. Returns its id.
    pub async fn capture_photo(
        &mut self,
        image: CapturedImage,
        direction: Option<Direction>,
        text: Option<String>,
    ) -> Result<i64> {
        if !self.state.is_recording() {
            return Err(Error::NotRecording);
        }

        let size = image.data.len();
        let mut photo = Photo::new(image.data, image.captured_at);
        photo.direction = direction;
        photo.location = self.state.current.map(|fix| fix.point().rounded());
        photo.heading = match self.state.heading.source() {
            HeadingSource::None => None,
            _ => Some(self.state.heading.current()),
        };
        photo.text = text.filter(|t| !t.trim().is_empty());

        let id = self.store.lock().await.insert_photo(&photo)?;
        self.state.photos_in_session += 1;
        info!(
            "Saved photo {} ({}x{}, {} bytes)",
            id, image.width, image.height, size
        );

        self.events.send(RecorderEvent::PhotoSaved {
            id,
            photos_in_session: self.state.photos_in_session,
            location: photo.location,
        });
        self.refresh_stats().await;
        Ok(id)
    }

    pub fn update_compass(&mut self, reading: &CompassReading) {
        if let Some(heading) = self.state.heading.update_from_compass(reading) {
            self.events.send(RecorderEvent::HeadingChanged { heading });
        }
    }

    /// React to the app being shown or hidden. Returns whether the wake lock is held.
    pub async fn on_visibility_change(&mut self, visible: bool) -> bool {
        let recording = self.state.is_recording();
        self.power.on_visibility_change(visible, recording).await
    }

    pub fn set_zoom(&mut self, zoom: u8) {
        self.state.set_zoom(zoom);
    }

    /// Open or close the live stats view. Opening it publishes stats immediately.
    pub async fn set_stats_view_open(&mut self, open: bool) {
        self.stats_view_open = open;
        self.refresh_stats().await;
    }

    pub fn current_point(&self) -> Option<GeoPoint> {
        self.state.current.map(|fix| fix.point())
    }

    async fn refresh_stats(&self) {
        if !self.stats_view_open {
            return;
        }
        match persistence::data_stats(&self.store).await {
            Ok(stats) => self.events.send(RecorderEvent::StatsChanged { stats }),
            Err(e) => warn!("Failed to refresh stats: {}", e),
        }
    }

    /// Write the whole trail under the session's id. Failures are logged only.
    async fn persist_track(&mut self) -> bool {
        let store = self.store.lock().await;
        let result = match self.state.track_id {
            Some(id) => store.save_track(id, &self.state.track),
            None => match store.insert_track(&self.state.track) {
                Ok(id) => {
                    self.state.track_id = Some(id);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to save track ({} points kept in memory): {}",
                    self.state.track.total_points(),
                    e
                );
                false
            }
        }
    }
}
