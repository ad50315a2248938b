//! Screen wake lock and heading coordination.
//!
//! The wake lock keeps the display on while recording. It is best effort:
//! an unsupported or refused lock is logged and recording carries on. The
//! platform drops the lock whenever the app is hidden, so it is requested
//! again when the app becomes visible during a recording.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use walklog_types::Fix;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeLockError {
    #[error("Wake lock is not supported on this platform")]
    Unsupported,
    #[error("Wake lock request was denied: {0}")]
    Denied(String),
}

/// A platform screen wake lock.
#[async_trait]
pub trait WakeLock: Send + Sync {
    async fn acquire(&self) -> Result<(), WakeLockError>;
    async fn release(&self) -> Result<(), WakeLockError>;
}

/// A wake lock for platforms that have none, such as a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedWakeLock;

#[async_trait]
impl WakeLock for UnsupportedWakeLock {
    async fn acquire(&self) -> Result<(), WakeLockError> {
        Err(WakeLockError::Unsupported)
    }

    async fn release(&self) -> Result<(), WakeLockError> {
        Ok(())
    }
}

/// Tracks whether the wake lock is held and never lets its failures escape.
pub struct PowerCoordinator {
    lock: Arc<dyn WakeLock>,
    held: bool,
}

impl PowerCoordinator {
    pub fn new(lock: Arc<dyn WakeLock>) -> Self {
        Self { lock, held: false }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Request the lock. Returns whether it is now held.
    pub async fn acquire(&mut self) -> bool {
        if self.held {
            return true;
        }
        match self.lock.acquire().await {
            Ok(()) => {
                info!("Screen wake lock acquired");
                self.held = true;
            }
            Err(WakeLockError::Unsupported) => {
                debug!("Screen wake lock not supported, continuing without it");
            }
            Err(e) => {
                warn!("Screen wake lock unavailable: {}", e);
            }
        }
        self.held
    }

    pub async fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        match self.lock.release().await {
            Ok(()) => info!("Screen wake lock released"),
            Err(e) => warn!("Failed to release screen wake lock: {}", e),
        }
    }

    /// React to the app being shown or hidden.
    ///
    /// Hiding implicitly drops the lock. Showing the app while `recording`
    /// requests it again.
    pub async fn on_visibility_change(&mut self, visible: bool, recording: bool) -> bool {
        if !visible {
            if self.held {
                debug!("App hidden, platform released the wake lock");
            }
            self.held = false;
            return false;
        }
        if recording {
            self.acquire().await
        } else {
            false
        }
    }
}

impl Drop for PowerCoordinator {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        // Release in the background if a runtime is still around
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let lock = Arc::clone(&self.lock);
            handle.spawn(async move {
                if let Err(e) = lock.release().await {
                    warn!("Failed to release screen wake lock on drop: {}", e);
                }
            });
        } else {
            warn!("PowerCoordinator dropped while holding the wake lock outside a runtime");
        }
    }
}

/// One compass sample from the orientation sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompassReading {
    /// Heading relative to true north, when the platform provides it.
    pub absolute_heading: Option<f64>,
    /// Device rotation around the z axis, counter-clockwise.
    pub alpha: Option<f64>,
}

impl CompassReading {
    pub fn absolute(heading: f64) -> Self {
        Self {
            absolute_heading: Some(heading),
            alpha: None,
        }
    }

    pub fn from_alpha(alpha: f64) -> Self {
        Self {
            absolute_heading: None,
            alpha: Some(alpha),
        }
    }

    /// Clockwise heading in degrees, `[0, 360)`.
    pub fn heading(&self) -> Option<f64> {
        self.absolute_heading
            .or_else(|| self.alpha.map(|alpha| 360.0 - alpha))
            .filter(|h| h.is_finite())
            .map(normalize_heading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingSource {
    #[default]
    None,
    Compass,
    Gps,
}

/// The current travel heading, from GPS when available and the compass otherwise.
///
/// Both feeds overwrite the value as they arrive, so whichever reported
/// last wins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadingTracker {
    heading: f64,
    source: HeadingSource,
}

impl HeadingTracker {
    pub fn current(&self) -> f64 {
        self.heading
    }

    pub fn source(&self) -> HeadingSource {
        self.source
    }

    /// Apply a compass sample. Returns the new heading if it changed.
    pub fn update_from_compass(&mut self, reading: &CompassReading) -> Option<f64> {
        let heading = reading.heading()?;
        self.set(heading, HeadingSource::Compass)
    }

    /// Apply the heading carried by a fix, if any.
    pub fn update_from_fix(&mut self, fix: &Fix) -> Option<f64> {
        let heading = fix.heading.filter(|h| h.is_finite())?;
        self.set(normalize_heading(heading), HeadingSource::Gps)
    }

    fn set(&mut self, heading: f64, source: HeadingSource) -> Option<f64> {
        let changed = self.source == HeadingSource::None || heading != self.heading;
        self.heading = heading;
        self.source = source;
        changed.then_some(heading)
    }
}

fn normalize_heading(heading: f64) -> f64 {
    let h = heading.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if h >= 360.0 { 0.0 } else { h }
}
