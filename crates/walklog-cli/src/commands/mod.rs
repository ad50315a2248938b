//! Command implementations for the CLI.

mod clear;
mod photos;
mod record;
mod stats;
mod sync;

pub use clear::cmd_clear;
pub use photos::cmd_photos;
pub use record::{RecordArgs, cmd_record};
pub use stats::{cmd_last_position, cmd_stats};
pub use sync::{cmd_export, cmd_import, cmd_list_remote, cmd_official_points};

use anyhow::{Context, Result};
use tracing::debug;

use walklog_core::persistence::{self, SharedStore};
use walklog_core::{EventDispatcher, RecorderState, SyncEngine};
use walklog_store::Store;

use crate::config::Config;
use crate::style;

/// Settings key marking local data as restored from a remote session.
pub const IMPORTED_KEY: &str = "walklog.imported";

/// How command output should look.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub quiet: bool,
    pub no_color: bool,
}

impl Output {
    pub fn success(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", style::format_success(message, self.no_color));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", style::format_info(message, self.no_color));
        }
    }

    /// Warnings are shown even when quiet.
    pub fn warning(&self, message: &str) {
        eprintln!("{}", style::format_warning(message, self.no_color));
    }
}

/// Open the configured database.
pub fn open_store(config: &Config) -> Result<SharedStore> {
    let path = config.database_path();
    debug!("Opening database {}", path.display());
    let mut store = Store::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    store
        .set_busy_timeout(config.storage.busy_timeout())
        .context("Failed to configure database")?;
    Ok(persistence::shared(store))
}

/// Rebuild what an earlier process knew about the local data.
///
/// Imported data stays non-exportable until a new recording starts. Data
/// this tool recorded is exported under the latest track's start label.
pub async fn stored_state(store: &SharedStore, config: &Config) -> Result<RecorderState> {
    let zoom = config.recorder.default_zoom;
    let guard = store.lock().await;

    let imported: bool = guard
        .get_setting(IMPORTED_KEY)
        .context("Failed to read settings")?
        .unwrap_or(false);
    if imported {
        return Ok(RecorderState::imported(zoom));
    }

    let zoom = guard
        .last_position()
        .context("Failed to read last position")?
        .map_or(zoom, |p| p.zoom);
    Ok(
        match guard.latest_track().context("Failed to read tracks")? {
            Some(stored) => RecorderState::with_stored_session(stored.track.start_timestamp(), zoom),
            None => RecorderState::new(zoom),
        },
    )
}

pub async fn set_imported(store: &SharedStore, imported: bool) -> Result<()> {
    store
        .lock()
        .await
        .put_setting(IMPORTED_KEY, &imported)
        .context("Failed to update settings")
}

pub fn sync_engine(
    config: &Config,
    store: SharedStore,
    events: EventDispatcher,
) -> Result<SyncEngine> {
    let remote = config.remote.connect()?;
    Ok(SyncEngine::new(remote, store, config.sync_config())?.with_events(events))
}
