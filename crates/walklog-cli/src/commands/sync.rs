//! Export, import, list-remote and official-points commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use walklog_core::persistence;
use walklog_core::remote::RemoteDocument;
use walklog_core::{
    EventDispatcher, EventReceiver, ExportOutcome, ExportReport, ImportOutcome, ImportReport,
    RecorderEvent, ReferencePoint, SyncPhase,
};

use crate::cli::OutputFormat;
use crate::commands::{Output, open_store, set_imported, stored_state, sync_engine};
use crate::config::Config;
use crate::prompt::CliPrompt;
use crate::style;

fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::UploadingPhotos => "Uploading photos",
        SyncPhase::WritingDocument => "Saving session",
        SyncPhase::ClearingLocal => "Clearing local data",
        SyncPhase::RestoringTracks => "Restoring tracks",
        SyncPhase::DownloadingPhotos => "Downloading photos",
    }
}

/// Show sync progress until every event sender is dropped.
///
/// The bar is only drawn once progress arrives, so it never overlaps a prompt.
fn spawn_progress(mut events: EventReceiver, quiet: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        loop {
            match events.recv().await {
                Ok(RecorderEvent::SyncProgress { phase, done, total }) => {
                    let bar = bar.get_or_insert_with(|| style::transfer_progress_bar(quiet));
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                    bar.set_message(phase_label(phase));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => debug!("Progress display skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    })
}

pub(crate) fn print_export_report(report: &ExportReport, out: Output) {
    out.success(&format!(
        "Exported \"{}\": {} track(s), {} point(s), {} photo(s)",
        report.name, report.tracks, report.total_points, report.uploaded
    ));
    if report.failed > 0 {
        out.warning(&format!(
            "{} photo(s) failed to upload and are not part of the export (local ids: {})",
            report.failed,
            report
                .failed_photo_ids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
}

fn print_import_report(report: &ImportReport, out: Output) {
    out.success(&format!(
        "Imported \"{}\": {} track(s), {} point(s), {} photo(s)",
        report.name, report.tracks, report.total_points, report.imported_photos
    ));
    if report.failed_tracks > 0 {
        out.warning(&format!(
            "{} track(s) could not be restored, see the log for details",
            report.failed_tracks
        ));
    }
    if report.has_discrepancy() {
        out.warning(&format!(
            "{} of {} photo(s) could not be downloaded",
            report.missing_photos(),
            report.expected_photos
        ));
    }
    if let Some(end) = report.view.end {
        out.info(&format!(
            "Track ends at {:.5}, {:.5} heading {:.0}°",
            end.lat, end.lng, report.view.end_heading
        ));
    }
    out.info("Export stays disabled for this data until a new recording starts");
}

pub async fn cmd_export(name: Option<String>, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    persistence::ensure_available(&store).await?;
    let state = stored_state(&store, config).await?;

    let events = EventDispatcher::default();
    let progress = spawn_progress(events.subscribe(), out.quiet);
    let engine = sync_engine(config, Arc::clone(&store), events)?;

    let mut prompt = CliPrompt::detect().with_name(name);
    let outcome = engine.export(&state, &mut prompt).await;
    drop(engine);
    let _ = progress.await;

    match outcome.context("Export failed")? {
        ExportOutcome::Exported(report) => print_export_report(&report, out),
        ExportOutcome::Cancelled => out.info("Export cancelled"),
    }
    Ok(())
}

pub async fn cmd_import(name: Option<String>, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    persistence::ensure_available(&store).await?;
    let mut state = stored_state(&store, config).await?;

    let events = EventDispatcher::default();
    let progress = spawn_progress(events.subscribe(), out.quiet);
    let engine = sync_engine(config, Arc::clone(&store), events)?;

    let mut prompt = CliPrompt::detect().with_name(name);
    let outcome = engine.import(&mut state, &mut prompt).await;
    drop(engine);
    let _ = progress.await;

    match outcome.context("Import failed")? {
        ImportOutcome::Imported(report) => {
            set_imported(&store, true).await?;
            print_import_report(&report, out);
        }
        ImportOutcome::NoDocuments => out.info("No exported sessions found"),
        ImportOutcome::Cancelled => out.info("Import cancelled, local data unchanged"),
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct SessionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Tracks")]
    tracks: String,
    #[tabled(rename = "Points")]
    points: String,
    #[tabled(rename = "Photos")]
    photos: String,
}

fn count_field(document: &RemoteDocument, field: &str) -> String {
    document
        .data
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .map_or_else(|| "-".to_string(), |n| n.to_string())
}

impl From<&RemoteDocument> for SessionRow {
    fn from(document: &RemoteDocument) -> Self {
        Self {
            name: document.display_name().to_string(),
            created: document.created_at().map_or_else(
                || "-".to_string(),
                |t| format!("{} {:02}:{:02}", t.date(), t.hour(), t.minute()),
            ),
            tracks: count_field(document, "tracksCount"),
            points: count_field(document, "totalPoints"),
            photos: count_field(document, "photosCount"),
        }
    }
}

pub async fn cmd_list_remote(format: OutputFormat, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    let engine = sync_engine(config, store, EventDispatcher::default())?;
    let documents = engine
        .list_documents()
        .await
        .context("Failed to list exported sessions")?;
    let rows: Vec<SessionRow> = documents.iter().map(SessionRow::from).collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text if rows.is_empty() => out.info("No exported sessions found"),
        OutputFormat::Text => {
            let mut table = Table::new(&rows);
            table.with(Style::rounded());
            println!("{}", table);
        }
    }
    Ok(())
}

#[derive(Debug, Tabled)]
struct ReferenceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Elevation")]
    elevation: String,
}

impl From<&ReferencePoint> for ReferenceRow {
    fn from(point: &ReferencePoint) -> Self {
        Self {
            id: point.id.clone().unwrap_or_else(|| "-".to_string()),
            name: point.name.clone().unwrap_or_else(|| "-".to_string()),
            location: format!("{:.5}, {:.5}", point.lat, point.lng),
            elevation: point
                .elevation
                .map_or_else(|| "-".to_string(), |e| format!("{:.1} m", e)),
        }
    }
}

pub async fn cmd_official_points(format: OutputFormat, config: &Config, out: Output) -> Result<()> {
    let store = open_store(config)?;
    let engine = sync_engine(config, store, EventDispatcher::default())?;
    let points = engine
        .load_reference_points()
        .await
        .context("Failed to load reference points")?;

    let Some(points) = points else {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Text => out.info("No reference points published"),
        }
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&points)?),
        OutputFormat::Text if points.is_empty() => {
            out.info("The reference point list has no usable entries");
        }
        OutputFormat::Text => {
            let rows: Vec<ReferenceRow> = points.iter().map(ReferenceRow::from).collect();
            let mut table = Table::new(&rows);
            table.with(Style::rounded());
            println!("{}", table);
            out.info(&format!("{} reference point(s)", rows.len()));
        }
    }
    Ok(())
}
