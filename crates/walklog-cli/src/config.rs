//! Configuration file management.
//!
//! ```toml
//! [storage]
//! path = "/home/me/.local/share/walklog/data.db"
//! busy_timeout_ms = 2000
//!
//! [sampler]
//! min_interval_secs = 5
//! record_interval_secs = 60
//! record_distance_m = 20.0
//!
//! [recorder]
//! default_zoom = 13
//!
//! [remote]
//! kind = "directory"
//! root = "/mnt/share/walklog"
//! collection = "projects"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use walklog_core::remote::{DirectoryRemote, RemoteStore};
use walklog_core::{RecorderConfig, SamplerConfig, SyncConfig};
use walklog_types::{DEFAULT_LAT, DEFAULT_LNG, DEFAULT_ZOOM, LastPosition};

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub sampler: SamplerConfig,
    pub recorder: RecorderSection,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    /// How long to wait for another walklog process holding the database.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 2000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Where the map opens before anything was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSection {
    pub default_zoom: u8,
    pub default_lat: f64,
    pub default_lng: f64,
}

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            default_zoom: DEFAULT_ZOOM,
            default_lat: DEFAULT_LAT,
            default_lng: DEFAULT_LNG,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    #[default]
    Directory,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub kind: RemoteKind,
    /// Root directory for `kind = "directory"`.
    pub root: Option<PathBuf>,
    /// Service URL for `kind = "http"`.
    pub base_url: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::Directory,
            root: None,
            base_url: None,
            collection: "projects".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// Point at `target`: an http(s) URL or a directory.
    pub fn override_with(&mut self, target: &str) {
        if target.starts_with("http://") || target.starts_with("https://") {
            self.kind = RemoteKind::Http;
            self.base_url = Some(target.to_string());
        } else {
            self.kind = RemoteKind::Directory;
            self.root = Some(PathBuf::from(target));
        }
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.collection.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.collection".to_string(),
                message: "collection cannot be empty".to_string(),
            });
        } else if self.collection.contains('/') {
            errors.push(ValidationError {
                field: "remote.collection".to_string(),
                message: format!("'{}' must not contain '/'", self.collection),
            });
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }
        match self.kind {
            RemoteKind::Directory => {
                if self.base_url.is_some() {
                    errors.push(ValidationError {
                        field: "remote.base_url".to_string(),
                        message: "only used with kind = \"http\"".to_string(),
                    });
                }
            }
            RemoteKind::Http => match self.base_url.as_deref() {
                None => errors.push(ValidationError {
                    field: "remote.base_url".to_string(),
                    message: "required with kind = \"http\"".to_string(),
                }),
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    errors.push(ValidationError {
                        field: "remote.base_url".to_string(),
                        message: format!("'{}' must start with http:// or https://", url),
                    });
                }
                Some(_) => {}
            },
        }

        errors
    }

    /// Build the configured remote. Fails if none is configured.
    pub fn connect(&self) -> anyhow::Result<Arc<dyn RemoteStore>> {
        match self.kind {
            RemoteKind::Directory => {
                let root = self.root.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "No remote configured. Pass --remote <DIR|URL> or set [remote] root in the config file."
                    )
                })?;
                Ok(Arc::new(DirectoryRemote::new(root)?))
            }
            #[cfg(feature = "http-remote")]
            RemoteKind::Http => {
                let url = self
                    .base_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("[remote] base_url is required for kind = \"http\""))?;
                let remote = walklog_core::HttpRemote::with_timeout(
                    url,
                    Duration::from_secs(self.timeout_secs),
                )?;
                Ok(Arc::new(remote))
            }
            #[cfg(not(feature = "http-remote"))]
            RemoteKind::Http => {
                anyhow::bail!("This build has no HTTP remote support (feature `http-remote`)")
            }
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walklog")
            .join("config.toml")
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let sampler = &self.sampler;
        for (field, value) in [
            ("sampler.min_interval_secs", sampler.min_interval_secs),
            ("sampler.record_interval_secs", sampler.record_interval_secs),
            ("sampler.record_distance_m", sampler.record_distance_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("must be a positive number, got {}", value),
                });
            }
        }
        if sampler.min_interval_secs >= sampler.record_interval_secs {
            errors.push(ValidationError {
                field: "sampler.min_interval_secs".to_string(),
                message: format!(
                    "must be less than record_interval_secs ({})",
                    sampler.record_interval_secs
                ),
            });
        }

        if self.storage.busy_timeout_ms > 60_000 {
            errors.push(ValidationError {
                field: "storage.busy_timeout_ms".to_string(),
                message: format!("{} is above the maximum of 60000", self.storage.busy_timeout_ms),
            });
        }

        let recorder = &self.recorder;
        if !(-90.0..=90.0).contains(&recorder.default_lat) {
            errors.push(ValidationError {
                field: "recorder.default_lat".to_string(),
                message: format!("{} is outside -90..90", recorder.default_lat),
            });
        }
        if !(-180.0..=180.0).contains(&recorder.default_lng) {
            errors.push(ValidationError {
                field: "recorder.default_lng".to_string(),
                message: format!("{} is outside -180..180", recorder.default_lng),
            });
        }
        if recorder.default_zoom > 22 {
            errors.push(ValidationError {
                field: "recorder.default_zoom".to_string(),
                message: format!("{} is above the maximum zoom of 22", recorder.default_zoom),
            });
        }

        errors.extend(self.remote.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, database: Option<PathBuf>, remote: Option<&str>) -> Self {
        if let Some(path) = database {
            self.storage.path = Some(path);
        }
        if let Some(target) = remote {
            self.remote.override_with(target);
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(walklog_store::default_db_path)
    }

    pub fn default_position(&self) -> LastPosition {
        LastPosition {
            lat: self.recorder.default_lat,
            lng: self.recorder.default_lng,
            zoom: self.recorder.default_zoom,
            timestamp: None,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            sampler: self.sampler,
            default_position: self.default_position(),
            ..Default::default()
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            collection: self.remote.collection.clone(),
            default_position: self.default_position(),
            ..Default::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `sampler.record_distance_m`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
