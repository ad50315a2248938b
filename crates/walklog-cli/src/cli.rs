//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use walklog_core::StartDecision;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What to do with existing local data when a recording starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartModeArg {
    /// Delete existing tracks and photos first
    Discard,
    /// Keep existing data and add a new session
    Append,
}

impl From<StartModeArg> for StartDecision {
    fn from(mode: StartModeArg) -> Self {
        match mode {
            StartModeArg::Discard => StartDecision::Discard,
            StartModeArg::Append => StartDecision::Append,
        }
    }
}

#[derive(Parser)]
#[command(name = "walklog")]
#[command(author, version, about = "Record GPS walking sessions with photos", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, env = "WALKLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local database file, overrides [storage] path
    #[arg(long, global = true, env = "WALKLOG_DB")]
    pub database: Option<PathBuf>,

    /// Remote directory or http(s) URL, overrides [remote]
    #[arg(long, global = true, env = "WALKLOG_REMOTE")]
    pub remote: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a session from a JSON-lines stream of position events
    Record {
        /// File with one event per line (fix, photo, error, compass, visibility)
        #[arg(short, long)]
        replay: PathBuf,

        /// Discard or append when local data exists (asks when omitted)
        #[arg(short, long, value_enum)]
        mode: Option<StartModeArg>,

        /// Wait between fixes as long as their timestamps say
        #[arg(long)]
        realtime: bool,

        /// Export the session under this name after stopping
        #[arg(short, long)]
        export: Option<String>,
    },

    /// Show what is stored locally
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the saved map position
    LastPosition {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List stored photos, newest first
    Photos {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Show at most this many photos
        #[arg(short, long)]
        limit: Option<u32>,

        /// Only photos that have not been uploaded
        #[arg(long)]
        pending: bool,
    },

    /// Delete all local tracks and photos, keeping the last position
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Upload local tracks and photos as a named session
    Export {
        /// Session name (asks when omitted, defaulting to the start time)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replace local data with an exported session
    Import {
        /// Session name (asks when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List exported sessions, newest first
    ListRemote {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the reference points published with exported sessions
    OfficialPoints {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
