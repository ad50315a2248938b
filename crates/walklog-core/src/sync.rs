//! Export to and import from remote storage.
//!
//! Export uploads every local photo, then writes one document holding all
//! local tracks and references to the photos that made it. A photo that
//! fails to upload is counted and left out; it never aborts the export.
//!
//! Import replaces local data with a remote document. The document is
//! fetched and parsed before anything local is touched, so a bad document
//! or an unreachable remote leaves local data as it was.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use walklog_store::PhotoQuery;
use walklog_types::{
    Direction, GeoPoint, LastPosition, Photo, Track, TrackStats, estimate_heading,
    geo::round_to,
};

use crate::error::{Error, Result};
use crate::events::{EventDispatcher, RecorderEvent, SyncPhase};
use crate::persistence::{self, SharedStore};
use crate::prompt::Prompt;
use crate::recorder::RecorderState;
use crate::reference::{self, REFERENCE_POINTS_ID, ReferencePoint};
use crate::remote::{BlobMetadata, OrderBy, RemoteDocument, RemoteError, RemoteStore};
use crate::retry::RetryConfig;

/// The exported session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub name: String,
    pub start_time: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
    #[serde(default)]
    pub tracks_count: usize,
    #[serde(default)]
    pub total_points: usize,
    /// Photos that were uploaded and are referenced in `photos`.
    #[serde(default)]
    pub photos_count: usize,
    #[serde(default)]
    pub photos_failed: usize,
}

/// A reference to an uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    pub url: Option<String>,
    pub storage_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub direction: Option<Direction>,
    pub location: Option<GeoPoint>,
    pub text: Option<String>,
    pub heading: Option<f64>,
}

impl ExportDocument {
    pub fn parse(document: &RemoteDocument) -> Result<Self> {
        serde_json::from_value(document.data.clone()).map_err(|e| {
            Error::Remote(RemoteError::InvalidDocument(format!("{}: {}", document.id, e)))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Remote collection holding exported sessions.
    pub collection: String,
    /// Candidate names tried before giving up, counting the base name.
    pub max_name_attempts: u32,
    pub wipe_retry: RetryConfig,
    pub default_position: LastPosition,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: "projects".to_string(),
            max_name_attempts: 100,
            wipe_retry: RetryConfig::for_wipe(),
            default_position: LastPosition::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(Error::InvalidConfig("collection must not be empty".to_string()));
        }
        if self.max_name_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_name_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub name: String,
    pub tracks: usize,
    pub total_points: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Local ids of photos that could not be uploaded.
    pub failed_photo_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Exported(ExportReport),
    Cancelled,
}

/// What the map should show after an import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RestoredView {
    /// All points of all tracks, in order.
    pub path: Vec<GeoPoint>,
    pub start: Option<GeoPoint>,
    pub end: Option<GeoPoint>,
    /// Estimated direction of travel at `end`.
    pub end_heading: f64,
}

impl RestoredView {
    fn from_tracks(tracks: &[Track]) -> Self {
        let path: Vec<GeoPoint> = tracks
            .iter()
            .flat_map(|t| t.points().iter().map(|p| p.point()))
            .collect();
        let start = path.first().copied();
        let end = path.last().copied();
        let end_heading = match end {
            Some(end) => estimate_heading(&end, &path),
            None => 0.0,
        };
        Self {
            path,
            start,
            end,
            end_heading,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub name: String,
    /// Tracks written to the local store.
    pub tracks: usize,
    /// Tracks in the document that could not be stored.
    pub failed_tracks: usize,
    pub total_points: usize,
    /// Photo references in the document.
    pub expected_photos: usize,
    /// Photos actually stored locally.
    pub imported_photos: usize,
    pub view: RestoredView,
}

impl ImportReport {
    pub fn missing_photos(&self) -> usize {
        self.expected_photos.saturating_sub(self.imported_photos)
    }

    pub fn has_discrepancy(&self) -> bool {
        self.expected_photos != self.imported_photos
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(ImportReport),
    /// The collection is empty.
    NoDocuments,
    Cancelled,
}

/// Blob path for a photo: `{collection}/{name}/photos/{unix_millis}.jpg`.
pub fn photo_path(collection: &str, name: &str, timestamp: OffsetDateTime) -> String {
    let millis = timestamp.unix_timestamp_nanos() / 1_000_000;
    format!("{collection}/{name}/photos/{millis}.jpg")
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    store: SharedStore,
    config: SyncConfig,
    events: EventDispatcher,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteStore>, store: SharedStore, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            remote,
            store,
            config,
            events: EventDispatcher::default(),
        })
    }

    /// Publish progress on `events`, typically the recorder's dispatcher.
    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn progress(&self, phase: SyncPhase, done: usize, total: usize) {
        self.events
            .send(RecorderEvent::SyncProgress { phase, done, total });
    }

    /// `base`, or `base_2`, `base_3`, ... whichever is free first.
    pub async fn unique_name(&self, base: &str) -> Result<String> {
        let collection = &self.config.collection;
        let mut candidate = base.to_string();
        let mut counter: u32 = 1;

        loop {
            if !self.remote.exists(collection, &candidate).await? {
                if counter > 1 {
                    debug!("Export name {} taken, using {}", base, candidate);
                }
                return Ok(candidate);
            }
            counter += 1;
            if counter > self.config.max_name_attempts {
                return Err(Error::NameExhausted {
                    base: base.to_string(),
                    attempts: self.config.max_name_attempts,
                });
            }
            candidate = format!("{base}_{counter}");
        }
    }

    /// Ask for a name and export.
    pub async fn export<Q: Prompt + ?Sized>(
        &self,
        state: &RecorderState,
        prompt: &mut Q,
    ) -> Result<ExportOutcome> {
        let default_name = state.export_basis()?;
        let name = match prompt.export_name(default_name).await {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                info!("Export cancelled");
                return Ok(ExportOutcome::Cancelled);
            }
        };
        self.export_as(state, &name).await.map(ExportOutcome::Exported)
    }

    /// Export everything in the local store under `name` (or the first free variant).
    pub async fn export_as(&self, state: &RecorderState, name: &str) -> Result<ExportReport> {
        let start_time = state.export_basis()?.to_string();
        if state.is_recording() {
            warn!("Exporting while recording; points recorded from now on are not included");
        }

        let name = self.unique_name(name).await?;
        let collection = &self.config.collection;

        let (tracks, photos) = {
            let store = self.store.lock().await;
            let tracks: Vec<Track> = store.list_tracks()?.into_iter().map(|t| t.track).collect();
            let photos = store.query_photos(&PhotoQuery::new().oldest_first())?;
            (tracks, photos)
        };

        let total = photos.len();
        let mut refs = Vec::with_capacity(total);
        let mut failed_photo_ids = Vec::new();
        let mut used_paths = HashSet::new();

        for (index, stored) in photos.into_iter().enumerate() {
            let photo = stored.photo;
            let path = unused_path(
                &mut used_paths,
                photo_path(collection, &name, photo.timestamp),
            );
            let metadata = upload_metadata(&photo);

            match self.remote.upload(&path, photo.data.clone(), &metadata).await {
                Ok(url) => {
                    let recorded = self.store.lock().await.set_photo_remote(stored.id, &url, &path);
                    if let Err(e) = recorded {
                        warn!("Uploaded photo {} but could not record its URL: {}", stored.id, e);
                    }
                    refs.push(PhotoRef {
                        url: Some(url),
                        storage_path: Some(path),
                        timestamp: photo.timestamp,
                        direction: photo.direction,
                        location: photo.location.map(|l| l.rounded()),
                        text: photo.text,
                        heading: photo.heading,
                    });
                }
                Err(e) => {
                    warn!("Failed to upload photo {} to {}: {}", stored.id, path, e);
                    failed_photo_ids.push(stored.id);
                }
            }
            self.progress(SyncPhase::UploadingPhotos, index + 1, total);
        }

        let tracks: Vec<Track> = tracks.iter().map(Track::rounded).collect();
        let stats = TrackStats::from_tracks(&tracks);
        let document = ExportDocument {
            name: name.clone(),
            start_time,
            created_at: OffsetDateTime::now_utc(),
            tracks_count: stats.track_count,
            total_points: stats.total_points,
            photos_count: refs.len(),
            photos_failed: failed_photo_ids.len(),
            tracks,
            photos: refs,
        };

        self.progress(SyncPhase::WritingDocument, 0, 1);
        self.remote
            .write(collection, &name, &serde_json::to_value(&document)?)
            .await?;
        self.progress(SyncPhase::WritingDocument, 1, 1);

        info!(
            "Exported {} ({} tracks, {} points, {} photos, {} failed)",
            name,
            document.tracks_count,
            document.total_points,
            document.photos_count,
            document.photos_failed
        );
        self.events.send(RecorderEvent::status(format!(
            "Saved {} ({} photos, {} failed)",
            name, document.photos_count, document.photos_failed
        )));

        Ok(ExportReport {
            name,
            tracks: document.tracks_count,
            total_points: document.total_points,
            uploaded: document.photos_count,
            failed: document.photos_failed,
            failed_photo_ids,
        })
    }

    /// Exported documents, newest first.
    ///
    /// The reference point document shares the collection but is not a session.
    pub async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        let documents = self
            .remote
            .list(&self.config.collection, &OrderBy::newest_first())
            .await?;
        Ok(documents
            .into_iter()
            .filter(|d| d.id != REFERENCE_POINTS_ID)
            .collect())
    }

    /// The published reference points, or `None` when there is no such document.
    pub async fn load_reference_points(&self) -> Result<Option<Vec<ReferencePoint>>> {
        let Some(document) = self
            .remote
            .get(&self.config.collection, REFERENCE_POINTS_ID)
            .await?
        else {
            info!("No reference points in {}", self.config.collection);
            return Ok(None);
        };
        let points = reference::parse_points(&document.data);
        info!("Loaded {} reference points", points.len());
        Ok(Some(points))
    }

    /// Let the user pick a document and import it.
    pub async fn import<Q: Prompt + ?Sized>(
        &self,
        state: &mut RecorderState,
        prompt: &mut Q,
    ) -> Result<ImportOutcome> {
        if state.is_recording() {
            return Err(Error::AlreadyRecording);
        }

        let documents = self.list_documents().await?;
        if documents.is_empty() {
            info!("No exported sessions in {}", self.config.collection);
            return Ok(ImportOutcome::NoDocuments);
        }

        let Some(document) = prompt
            .choose_document(&documents)
            .await
            .and_then(|index| documents.get(index))
        else {
            info!("Import cancelled");
            return Ok(ImportOutcome::Cancelled);
        };

        self.import_document(state, document)
            .await
            .map(ImportOutcome::Imported)
    }

    /// Replace local data with `document`.
    pub async fn import_document(
        &self,
        state: &mut RecorderState,
        document: &RemoteDocument,
    ) -> Result<ImportReport> {
        if state.is_recording() {
            return Err(Error::AlreadyRecording);
        }
        let parsed = ExportDocument::parse(document)?;

        self.progress(SyncPhase::ClearingLocal, 0, 1);
        let kept = persistence::wipe_local(
            &self.store,
            &self.config.default_position,
            &self.config.wipe_retry,
        )
        .await?;
        self.events.send(RecorderEvent::DataCleared { kept });
        self.progress(SyncPhase::ClearingLocal, 1, 1);

        let track_total = parsed.tracks.len();
        let mut restored = Vec::with_capacity(track_total);
        for (index, track) in parsed.tracks.iter().enumerate() {
            match self.store.lock().await.insert_track(track) {
                Ok(_) => restored.push(track.clone()),
                Err(e) => warn!(
                    "Failed to restore track {} ({} points): {}",
                    track.start_timestamp(),
                    track.total_points(),
                    e
                ),
            }
            self.progress(SyncPhase::RestoringTracks, index + 1, track_total);
        }
        let failed_tracks = track_total - restored.len();
        let view = RestoredView::from_tracks(&restored);

        let expected_photos = parsed.photos.len();
        for (index, photo_ref) in parsed.photos.iter().enumerate() {
            if let Some(photo) = self.download_photo(photo_ref).await {
                if let Err(e) = self.store.lock().await.insert_photo(&photo) {
                    warn!("Failed to store imported photo {}: {}", photo.timestamp, e);
                }
            }
            self.progress(SyncPhase::DownloadingPhotos, index + 1, expected_photos);
        }

        let imported_photos = self.store.lock().await.count_photos()? as usize;
        if failed_tracks > 0 {
            warn!(
                "Restored {} of {} tracks from {}",
                restored.len(),
                track_total,
                parsed.name
            );
        }
        if imported_photos != expected_photos {
            warn!(
                "Imported {} of {} photos from {}",
                imported_photos, expected_photos, parsed.name
            );
        }

        state.mark_imported();

        let report = ImportReport {
            name: parsed.name,
            tracks: restored.len(),
            failed_tracks,
            total_points: view.path.len(),
            expected_photos,
            imported_photos,
            view,
        };
        info!(
            "Imported {} ({} tracks, {} points, {}/{} photos)",
            report.name, report.tracks, report.total_points, imported_photos, expected_photos
        );
        self.events.send(RecorderEvent::status(format!(
            "Loaded {} ({} points)",
            report.name, report.total_points
        )));
        Ok(report)
    }

    /// Fetch one referenced photo. Failures are logged and yield `None`.
    async fn download_photo(&self, photo_ref: &PhotoRef) -> Option<Photo> {
        let mut source_url = None;

        if let Some(path) = &photo_ref.storage_path {
            let fetched = match self.remote.resolve_url(path).await {
                Ok(url) => self.remote.fetch(&url).await.map(|data| (url, data)),
                Err(e) => Err(e),
            };
            match fetched {
                Ok(found) => source_url = Some(found),
                Err(e) => warn!("Failed to download photo at {}: {}", path, e),
            }
        }

        if source_url.is_none() {
            if let Some(url) = &photo_ref.url {
                match self.remote.fetch(url).await {
                    Ok(data) => source_url = Some((url.clone(), data)),
                    Err(e) => warn!("Failed to download photo from {}: {}", url, e),
                }
            }
        }

        let Some((url, data)) = source_url else {
            if photo_ref.storage_path.is_none() && photo_ref.url.is_none() {
                warn!("Skipping photo {} without a URL or path", photo_ref.timestamp);
            }
            return None;
        };

        let mut photo = Photo::new(data, photo_ref.timestamp);
        photo.direction = photo_ref.direction;
        photo.location = photo_ref.location.map(|l| l.rounded());
        photo.heading = photo_ref.heading;
        photo.text = photo_ref.text.clone();
        photo.remote_url = Some(url);
        photo.storage_path = photo_ref.storage_path.clone();
        Some(photo)
    }
}

fn upload_metadata(photo: &Photo) -> BlobMetadata {
    let timestamp = photo
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| photo.timestamp.unix_timestamp().to_string());
    let mut metadata = BlobMetadata::jpeg().with("timestamp", timestamp);
    if let Some(location) = photo.location {
        metadata = metadata
            .with("lat", round_to(location.lat, 5).to_string())
            .with("lng", round_to(location.lng, 5).to_string());
    }
    metadata
}

/// Photos taken within the same millisecond would share a path.
fn unused_path(used: &mut HashSet<String>, path: String) -> String {
    if used.insert(path.clone()) {
        return path;
    }
    let stem = path.trim_end_matches(".jpg");
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}.jpg");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
