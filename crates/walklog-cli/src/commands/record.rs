//! Record command - replay a position stream through the recorder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use walklog_core::{
    CapturedImage, ChannelSource, EventReceiver, FixOutcome, Recorder, RecorderEvent,
    StartMode, StartOutcome, UnsupportedWakeLock,
};

use crate::cli::StartModeArg;
use crate::commands::sync::print_export_report;
use crate::commands::{Output, open_store, set_imported, sync_engine};
use crate::config::Config;
use crate::prompt::CliPrompt;
use crate::replay::{Replay, ReplayEvent};
use crate::style;

/// Arguments for the record command.
pub struct RecordArgs {
    pub replay: PathBuf,
    pub mode: Option<StartModeArg>,
    pub realtime: bool,
    pub export: Option<String>,
}

#[derive(Debug, Default)]
struct ReplayTally {
    accepted: usize,
    skipped: usize,
    errors: usize,
    photos_failed: usize,
}

pub async fn cmd_record(args: RecordArgs, config: &Config, out: Output) -> Result<()> {
    let replay = Replay::load(&args.replay)?;
    if replay.events.is_empty() {
        bail!("{} contains no events", args.replay.display());
    }

    let store = open_store(config)?;
    let source = ChannelSource::new();
    let feed = source.feed();
    let mut recorder = Recorder::new(
        Arc::clone(&store),
        Arc::new(source),
        Arc::new(UnsupportedWakeLock),
        config.recorder_config(),
    )?;

    let mut prompt = CliPrompt::detect().with_mode(args.mode.map(Into::into));
    let outcome = recorder
        .start(&mut prompt)
        .await
        .context("Failed to start recording")?;
    match outcome {
        StartOutcome::Started { mode, .. } => {
            debug!("Started in {:?} mode", mode);
            if mode == StartMode::Discarded {
                out.info("Existing data discarded");
            }
        }
        StartOutcome::AlreadyRecording => bail!("A recording is already in progress"),
        StartOutcome::Cancelled => {
            out.info("Recording not started");
            return Ok(());
        }
    }
    set_imported(&store, false).await?;

    let spinner = style::operation_spinner("Recording (0 points)", out.quiet);
    let printer = tokio::spawn(print_events(
        recorder.subscribe_events(),
        spinner.clone(),
        out,
    ));

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        })
    };

    let mut tally = ReplayTally::default();
    for (index, event) in replay.events.iter().enumerate() {
        if args.realtime {
            let delay = replay.delay_before(index);
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        if shutdown.is_cancelled() {
            warn!("Interrupted after {} of {} events", index, replay.events.len());
            break;
        }

        match event {
            ReplayEvent::Fix { .. } => {
                let Some(fix) = event.to_fix(OffsetDateTime::now_utc()) else {
                    continue;
                };
                if !feed.send_fix(fix).await {
                    bail!("Position subscription closed unexpectedly");
                }
                match recorder.pump().await {
                    Some(FixOutcome::Accepted { .. }) => tally.accepted += 1,
                    Some(FixOutcome::Rejected(_)) => tally.skipped += 1,
                    Some(_) | None => {}
                }
            }
            ReplayEvent::Error { error } => {
                if feed.send_error(error.clone()).await {
                    recorder.pump().await;
                }
                tally.errors += 1;
            }
            ReplayEvent::Photo {
                path,
                direction,
                text,
                width,
                height,
            } => {
                let path = replay.resolve(path);
                let captured = match tokio::fs::read(&path).await {
                    Ok(data) => {
                        let image = CapturedImage::new(data, *width, *height);
                        recorder
                            .capture_photo(image, *direction, text.clone())
                            .await
                            .map(|_| ())
                            .map_err(anyhow::Error::from)
                    }
                    Err(e) => Err(anyhow::Error::new(e)
                        .context(format!("Failed to read {}", path.display()))),
                };
                if let Err(e) = captured {
                    warn!("Photo not saved: {:#}", e);
                    tally.photos_failed += 1;
                }
            }
            ReplayEvent::Compass { .. } => {
                if let Some(reading) = event.to_compass() {
                    recorder.update_compass(&reading);
                }
            }
            ReplayEvent::Visibility { visible } => {
                let held = recorder.on_visibility_change(*visible).await;
                debug!("Visible: {}, wake lock held: {}", visible, held);
            }
        }
    }
    ctrl_c.abort();

    let summary = recorder.stop().await;
    spinner.finish_and_clear();

    if let Some(summary) = &summary {
        out.success(&format!(
            "Recorded {} point(s) and {} photo(s)",
            summary.total_points, summary.photos
        ));
        if !summary.persisted {
            out.warning("The final track write failed; the last few points may be missing");
        }
    }
    out.info(&format!(
        "{} fix(es) replayed: {} kept, {} skipped, {} error(s)",
        replay.fix_count(),
        tally.accepted,
        tally.skipped,
        tally.errors
    ));
    if tally.photos_failed > 0 {
        out.warning(&format!("{} photo(s) could not be saved", tally.photos_failed));
    }

    if let Some(name) = args.export {
        let engine = sync_engine(config, Arc::clone(&store), recorder.events().clone())?;
        let report = engine
            .export_as(recorder.state(), &name)
            .await
            .context("Export failed")?;
        print_export_report(&report, out);
    }

    drop(recorder);
    let _ = printer.await;
    Ok(())
}

/// Mirror recorder events onto the spinner until the recorder goes away.
async fn print_events(mut events: EventReceiver, spinner: ProgressBar, out: Output) {
    loop {
        match events.recv().await {
            Ok(RecorderEvent::Status { message }) => spinner.set_message(message),
            Ok(RecorderEvent::PositionError { error }) => {
                style::print_suspended(
                    &spinner,
                    &style::format_warning(&error.to_string(), out.no_color),
                );
            }
            Ok(RecorderEvent::PhotoSaved {
                id,
                photos_in_session,
                location,
            }) => {
                let place = location
                    .map(|p| format!(" at {:.5}, {:.5}", p.lat, p.lng))
                    .unwrap_or_default();
                debug!("Photo {} saved{} ({} this session)", id, place, photos_in_session);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => debug!("Event printer skipped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}
