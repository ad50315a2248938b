//! Command-line recorder for GPS walking sessions.
//!
//! The `walklog` binary drives the recording engine from `walklog-core` with
//! a replayed position stream standing in for a device's location provider,
//! camera and compass. Sessions are kept in the local SQLite store and can be
//! exported to, and imported from, a directory or HTTP remote.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `record` | Record a session from a JSON-lines replay |
//! | `stats` | Show the size of local data |
//! | `last-position` | Show the saved map position |
//! | `photos` | List stored photos, newest first |
//! | `clear` | Delete local tracks and photos |
//! | `export` | Upload local data as a named session |
//! | `import` | Replace local data with an exported session |
//! | `list-remote` | List exported sessions, newest first |
//! | `official-points` | Show published reference points |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! (`~/.config/walklog/config.toml` on Linux), or from `--config`. See
//! [`config::Config`] for the available sections.
//!
//! # Environment Variables
//!
//! - `WALKLOG_CONFIG`: configuration file
//! - `WALKLOG_DB`: local database file
//! - `WALKLOG_REMOTE`: remote directory or URL
//! - `NO_COLOR`: disable colored output
//! - `RUST_LOG`: log filter when neither `--quiet` nor `--verbose` is given
//!
//! # Examples
//!
//! Record a walk, discarding whatever was stored before:
//! ```bash
//! walklog record --replay morning.jsonl --mode discard
//! ```
//!
//! Export it to a shared directory and restore it elsewhere:
//! ```bash
//! walklog --remote /mnt/share/walklog export --name morning
//! walklog --remote /mnt/share/walklog import --name morning
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod prompt;
pub mod replay;
pub mod style;
