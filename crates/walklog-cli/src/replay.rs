//! JSON-lines position replays.
//!
//! A replay stands in for the device's location provider, camera and
//! compass. Each non-empty line is one event:
//!
//! ```text
//! # comment lines and blank lines are skipped
//! {"type":"fix","lat":34.85,"lng":135.47,"accuracy":5,"timestamp":"2025-03-01T09:00:00Z"}
//! {"type":"photo","path":"img/0001.jpg","direction":"left","text":"bridge"}
//! {"type":"error","error":{"kind":"timeout"}}
//! {"type":"compass","absolute_heading":270}
//! {"type":"visibility","visible":false}
//! ```
//!
//! Photo paths are resolved relative to the replay file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use walklog_core::{CompassReading, PositionError};
use walklog_types::{Direction, Fix};

/// Accuracy assumed when a fix line leaves it out, in meters.
const DEFAULT_ACCURACY_M: f64 = 10.0;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read replay file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Replay line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Fix {
        lat: f64,
        lng: f64,
        #[serde(default = "default_accuracy")]
        accuracy: f64,
        /// Delivery time when omitted.
        #[serde(default, with = "time::serde::rfc3339::option")]
        timestamp: Option<OffsetDateTime>,
        #[serde(default)]
        heading: Option<f64>,
    },
    Photo {
        path: PathBuf,
        #[serde(default)]
        direction: Option<Direction>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        width: u32,
        #[serde(default)]
        height: u32,
    },
    Error {
        error: PositionError,
    },
    Compass {
        #[serde(default)]
        absolute_heading: Option<f64>,
        #[serde(default)]
        alpha: Option<f64>,
    },
    Visibility {
        visible: bool,
    },
}

fn default_accuracy() -> f64 {
    DEFAULT_ACCURACY_M
}

impl ReplayEvent {
    /// The fix this line describes, stamped with `now` when it has no timestamp.
    pub fn to_fix(&self, now: OffsetDateTime) -> Option<Fix> {
        match *self {
            ReplayEvent::Fix {
                lat,
                lng,
                accuracy,
                timestamp,
                heading,
            } => {
                let mut fix = Fix::new(lat, lng, accuracy, timestamp.unwrap_or(now));
                fix.heading = heading;
                Some(fix)
            }
            _ => None,
        }
    }

    pub fn to_compass(&self) -> Option<CompassReading> {
        match *self {
            ReplayEvent::Compass {
                absolute_heading,
                alpha,
            } => Some(CompassReading {
                absolute_heading,
                alpha,
            }),
            _ => None,
        }
    }

    fn timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            ReplayEvent::Fix { timestamp, .. } => *timestamp,
            _ => None,
        }
    }
}

/// A parsed replay file.
#[derive(Debug, Clone, Default)]
pub struct Replay {
    pub events: Vec<ReplayEvent>,
    /// Directory photo paths are relative to.
    pub base_dir: PathBuf,
}

impl Replay {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReplayError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            events: parse_lines(&content)?,
            base_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn fix_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ReplayEvent::Fix { .. }))
            .count()
    }

    /// How long to wait before event `index` when replaying in real time.
    ///
    /// The gap between this fix's timestamp and the previous timestamped
    /// fix. Zero for everything else.
    pub fn delay_before(&self, index: usize) -> Duration {
        let Some(current) = self.events.get(index).and_then(ReplayEvent::timestamp) else {
            return Duration::ZERO;
        };
        let previous = self.events[..index]
            .iter()
            .rev()
            .find_map(ReplayEvent::timestamp);
        match previous {
            Some(previous) if current > previous => {
                (current - previous).try_into().unwrap_or(Duration::ZERO)
            }
            _ => Duration::ZERO,
        }
    }
}

/// Parse replay text, skipping blank lines and `#` comments.
pub fn parse_lines(content: &str) -> Result<Vec<ReplayEvent>, ReplayError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| ReplayError::Parse {
                line: index + 1,
                source: e,
            })
        })
        .collect()
}
