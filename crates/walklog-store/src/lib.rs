//! Local persistence for walklog recordings.
//!
//! This crate provides SQLite-based storage for recorded tracks, captured
//! photos and small settings such as the last map position. The store is
//! the single source of truth for exports and survives process restarts.
//!
//! # Features
//!
//! - Overwrite-in-place track saves, so every accepted waypoint is durable
//! - Photo storage with remote location bookkeeping
//! - Transactional wipe that keeps the last map position
//! - Close/reopen of the underlying connection
//!
//! # Example
//!
//! ```no_run
//! use walklog_store::{PhotoQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let stats = store.data_stats()?;
//! println!("{} tracks, {} points", stats.track_count, stats.total_points);
//!
//! let recent = store.query_photos(&PhotoQuery::new().limit(10))?;
//! # Ok::<(), walklog_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{DataStats, StoredPhoto, StoredTrack};
pub use queries::PhotoQuery;
pub use store::{LAST_POSITION_KEY, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/walklog/data.db`
/// - macOS: `~/Library/Application Support/walklog/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\walklog\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("walklog")
        .join("data.db")
}
