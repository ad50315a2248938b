//! Stats and last-position commands.

use anyhow::{Context, Result};
use serde::Serialize;

use walklog_core::persistence;
use walklog_store::DataStats;
use walklog_types::LastPosition;

use crate::cli::OutputFormat;
use crate::commands::{Output, open_store};
use crate::config::Config;
use crate::style::{format_data_size, format_title};

#[derive(Debug, Serialize)]
struct StatsJson {
    #[serde(flatten)]
    stats: DataStats,
    total_bytes: u64,
}

pub async fn cmd_stats(format: OutputFormat, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    persistence::ensure_available(&store).await?;
    let stats = persistence::data_stats(&store)
        .await
        .context("Failed to read local data")?;

    match format {
        OutputFormat::Json => {
            let json = StatsJson {
                stats,
                total_bytes: stats.total_bytes(),
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{}", format_title("Local data", out.no_color));
            println!("  Tracks:      {}", stats.track_count);
            println!("  Points:      {}", stats.total_points);
            println!("  GPS data:    {}", format_data_size(stats.gps_bytes));
            println!("  Photos:      {}", stats.photo_count);
            println!("  Photo data:  {}", format_data_size(stats.photo_bytes));
            println!("  Total:       {}", format_data_size(stats.total_bytes()));
            if !stats.has_data() {
                out.info("Nothing recorded yet");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PositionJson {
    #[serde(flatten)]
    position: LastPosition,
    saved: bool,
}

pub async fn cmd_last_position(format: OutputFormat, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    let saved = store
        .lock()
        .await
        .last_position()
        .context("Failed to read last position")?;
    let position = saved.unwrap_or_else(|| config.default_position());

    match format {
        OutputFormat::Json => {
            let json = PositionJson {
                position,
                saved: saved.is_some(),
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!(
                "{:.5}, {:.5} (zoom {})",
                position.lat, position.lng, position.zoom
            );
            match (saved, position.timestamp) {
                (Some(_), Some(at)) => out.info(&format!("Saved {}", at.date())),
                (Some(_), None) => {}
                (None, _) => out.info("No position saved yet, showing the default"),
            }
        }
    }
    Ok(())
}
