//! Export and import against the in-memory and directory remotes.

use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use walklog_core::mock::{MemoryRemote, MockPositionSource, ScriptedPrompt};
use walklog_core::persistence::{self, SharedStore};
use walklog_core::remote::RemoteStore;
use walklog_core::{
    CapturedImage, DirectoryRemote, Error, EventDispatcher, ExportDocument, ExportOutcome,
    ImportOutcome, PositionFeed, Recorder, RecorderConfig, RecorderEvent, RemoteDocument,
    RemoteError, StartDecision, SyncConfig, SyncEngine, SyncPhase, UnsupportedWakeLock,
};
use walklog_store::Store;
use walklog_types::{Direction, Fix, GeoPoint};

const T0: i64 = 1_735_725_600;

fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(T0 + secs).unwrap()
}

fn store() -> SharedStore {
    persistence::shared(Store::open_in_memory().unwrap())
}

fn idle_recorder(store: &SharedStore) -> (Recorder, PositionFeed) {
    let source = Arc::new(MockPositionSource::new());
    let feed = source.feed();
    let recorder = Recorder::new(
        store.clone(),
        source,
        Arc::new(UnsupportedWakeLock),
        RecorderConfig::default(),
    )
    .unwrap();
    (recorder, feed)
}

/// Record `points` fixes one minute apart and `photos` photos, then stop.
async fn record_session(store: &SharedStore, points: i64, photos: i64) -> Recorder {
    let (mut recorder, feed) = idle_recorder(store);
    recorder
        .start(&mut ScriptedPrompt::new().then_start(StartDecision::Append))
        .await
        .unwrap();

    for i in 0..points {
        feed.send_fix(Fix::new(35.0 + 0.001 * i as f64, 135.0, 5.0, at(i * 60)))
            .await;
        recorder.pump().await.unwrap();
    }
    for i in 0..photos {
        let image = CapturedImage::new(vec![0xFF, 0xD8, i as u8], 640, 480).captured_at(at(i));
        recorder
            .capture_photo(image, Some(Direction::Up), None)
            .await
            .unwrap();
    }
    recorder.stop().await.unwrap();
    recorder
}

fn engine(remote: Arc<dyn RemoteStore>, store: &SharedStore) -> SyncEngine {
    SyncEngine::new(remote, store.clone(), SyncConfig::default()).unwrap()
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn test_export_writes_document_and_blobs() {
    let store = store();
    let recorder = record_session(&store, 3, 2).await;
    let remote = Arc::new(MemoryRemote::new());
    let sync = engine(remote.clone(), &store);

    let mut prompt = ScriptedPrompt::new().then_name(Some("morning walk"));
    let outcome = sync.export(recorder.state(), &mut prompt).await.unwrap();
    let ExportOutcome::Exported(report) = outcome else {
        panic!("export was cancelled");
    };

    assert_eq!(report.name, "morning walk");
    assert_eq!(report.total_points, 3);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(
        prompt.offered_names,
        [recorder.state().start_label().unwrap()]
    );

    let value = remote.document("projects", "morning walk").await.unwrap();
    let doc: ExportDocument = serde_json::from_value(value).unwrap();
    assert_eq!(doc.tracks_count, 1);
    assert_eq!(doc.photos_count, 2);
    assert_eq!(doc.start_time, recorder.state().start_label().unwrap());
    assert!(
        doc.photos[0]
            .storage_path
            .as_deref()
            .unwrap()
            .starts_with("projects/morning walk/photos/")
    );
    assert_eq!(remote.blob_count().await, 2);

    // uploaded photos remember where they went
    let uploaded = store.lock().await.query_photos(&Default::default()).unwrap();
    assert!(uploaded.iter().all(|p| p.is_uploaded()));
}

#[tokio::test]
async fn test_export_isolates_failed_photo() {
    let store = store();
    let recorder = record_session(&store, 2, 100).await;
    let remote = Arc::new(MemoryRemote::new());
    remote.fail_upload_at(42).await;
    let sync = engine(remote.clone(), &store);

    let report = sync.export_as(recorder.state(), "hundred").await.unwrap();
    assert_eq!(report.uploaded, 99);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_photo_ids.len(), 1);

    let doc: ExportDocument =
        serde_json::from_value(remote.document("projects", "hundred").await.unwrap()).unwrap();
    assert_eq!(doc.photos.len(), 99);
    assert_eq!(doc.photos_count, 99);
    assert_eq!(doc.photos_failed, 1);
    // photo #42 was taken at offset 41s
    assert!(doc.photos.iter().all(|p| p.timestamp != at(41)));
    assert!(doc.photos.iter().any(|p| p.timestamp == at(40)));
}

#[tokio::test]
async fn test_export_name_collision_gets_suffix() {
    let store = store();
    let recorder = record_session(&store, 1, 0).await;
    let remote = Arc::new(MemoryRemote::new());
    remote
        .insert_document("projects", "walk", json!({ "name": "walk" }))
        .await;
    let sync = engine(remote.clone(), &store);

    let first = sync.export_as(recorder.state(), "walk").await.unwrap();
    assert_eq!(first.name, "walk_2");
    let second = sync.export_as(recorder.state(), "walk").await.unwrap();
    assert_eq!(second.name, "walk_3");
    assert_eq!(remote.document_count().await, 3);
}

#[tokio::test]
async fn test_export_name_attempts_are_bounded() {
    let store = store();
    let recorder = record_session(&store, 1, 0).await;
    let remote = Arc::new(MemoryRemote::new());
    remote.insert_document("projects", "w", json!({})).await;
    remote.insert_document("projects", "w_2", json!({})).await;
    let config = SyncConfig {
        max_name_attempts: 2,
        ..Default::default()
    };
    let sync = SyncEngine::new(remote, store.clone(), config).unwrap();

    let result = sync.export_as(recorder.state(), "w").await;
    assert!(matches!(result, Err(Error::NameExhausted { attempts: 2, .. })));
}

#[tokio::test]
async fn test_export_dismissed_name_cancels() {
    let store = store();
    let recorder = record_session(&store, 1, 0).await;
    let remote = Arc::new(MemoryRemote::new());
    let sync = engine(remote.clone(), &store);

    let outcome = sync
        .export(recorder.state(), &mut ScriptedPrompt::new().then_name(None))
        .await
        .unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert_eq!(remote.document_count().await, 0);
}

#[tokio::test]
async fn test_export_without_session_refused() {
    let store = store();
    let (recorder, _feed) = idle_recorder(&store);
    let sync = engine(Arc::new(MemoryRemote::new()), &store);
    let result = sync.export_as(recorder.state(), "x").await;
    assert!(matches!(result, Err(Error::NoSession)));
}

#[tokio::test]
async fn test_export_offline_fails_before_upload() {
    let store = store();
    let recorder = record_session(&store, 1, 1).await;
    let remote = Arc::new(MemoryRemote::new());
    remote.set_offline(true);
    let sync = engine(remote.clone(), &store);

    let result = sync.export_as(recorder.state(), "x").await;
    assert!(matches!(
        result,
        Err(Error::Remote(RemoteError::Unreachable(_)))
    ));
    assert_eq!(remote.upload_calls(), 0);
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_round_trip_restores_tracks_and_photos() {
    let source_store = store();
    let recorder = record_session(&source_store, 4, 3).await;
    let remote = Arc::new(MemoryRemote::new());
    engine(remote.clone(), &source_store)
        .export_as(recorder.state(), "trip")
        .await
        .unwrap();

    let target_store = store();
    record_session(&target_store, 2, 1).await;
    let (mut target, _feed) = idle_recorder(&target_store);
    let dispatcher = EventDispatcher::default();
    let mut events = dispatcher.subscribe();
    let sync = engine(remote.clone(), &target_store).with_events(dispatcher);

    let mut prompt = ScriptedPrompt::new().then_choose(Some(0));
    let outcome = sync.import(target.state_mut(), &mut prompt).await.unwrap();
    let ImportOutcome::Imported(report) = outcome else {
        panic!("import did not run");
    };

    assert_eq!(report.name, "trip");
    assert_eq!(report.total_points, 4);
    assert_eq!(report.failed_tracks, 0);
    assert_eq!(report.expected_photos, 3);
    assert_eq!(report.imported_photos, 3);
    assert!(!report.has_discrepancy());
    assert_eq!(report.view.path.len(), 4);
    assert_eq!(prompt.offered_documents, [vec!["trip".to_string()]]);

    let stats = persistence::data_stats(&target_store).await.unwrap();
    assert_eq!(stats.track_count, 1);
    assert_eq!(stats.total_points, 4);
    assert_eq!(stats.photo_count, 3);

    // imported sessions cannot be exported again
    assert!(!target.state().export_enabled());
    assert!(matches!(
        sync.export_as(target.state(), "again").await,
        Err(Error::ExportDisabled)
    ));

    let mut saw_download = false;
    while let Ok(event) = events.try_recv() {
        if let RecorderEvent::SyncProgress {
            phase: SyncPhase::DownloadingPhotos,
            ..
        } = event
        {
            saw_download = true;
        }
    }
    assert!(saw_download);
}

#[tokio::test]
async fn test_import_reports_missing_photos() {
    let source_store = store();
    let recorder = record_session(&source_store, 1, 3).await;
    let remote = Arc::new(MemoryRemote::new());
    engine(remote.clone(), &source_store)
        .export_as(recorder.state(), "lossy")
        .await
        .unwrap();
    let first_millis = at(0).unix_timestamp_nanos() / 1_000_000;
    assert!(
        remote
            .remove_blob(&format!("projects/lossy/photos/{first_millis}.jpg"))
            .await
    );

    let target_store = store();
    let (mut target, _feed) = idle_recorder(&target_store);
    let sync = engine(remote, &target_store);
    let doc = sync.list_documents().await.unwrap().remove(0);
    let report = sync.import_document(target.state_mut(), &doc).await.unwrap();

    assert_eq!(report.expected_photos, 3);
    assert_eq!(report.imported_photos, 2);
    assert_eq!(report.missing_photos(), 1);
}

#[tokio::test]
async fn test_import_skips_track_the_store_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("walklog.db");
    let store = persistence::shared(Store::open(&db).unwrap());
    rusqlite::Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_track BEFORE INSERT ON tracks
             WHEN NEW.start_timestamp = '2025-01-01T10:05'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    let point = |secs: i64, lat: f64| {
        json!({
            "lat": lat,
            "lng": 135.0,
            "timestamp": at(secs).format(&Rfc3339).unwrap(),
            "accuracy": 5.0,
        })
    };
    let doc = RemoteDocument::new(
        "split",
        json!({
            "name": "split",
            "startTime": "2025-01-01T10:00",
            "createdAt": at(900).format(&Rfc3339).unwrap(),
            "tracks": [
                { "startTimestamp": "2025-01-01T10:00", "points": [point(0, 35.0), point(60, 35.001)] },
                { "startTimestamp": "2025-01-01T10:05", "points": [point(300, 35.002)] },
                { "startTimestamp": "2025-01-01T10:10", "points": [point(600, 35.003)] },
            ],
        }),
    );

    let (mut target, _feed) = idle_recorder(&store);
    let sync = engine(Arc::new(MemoryRemote::new()), &store);
    let report = sync.import_document(target.state_mut(), &doc).await.unwrap();

    assert_eq!(report.tracks, 2);
    assert_eq!(report.failed_tracks, 1);
    assert_eq!(report.total_points, 3);
    assert_eq!(report.view.end, Some(GeoPoint::new(35.003, 135.0)));

    let stats = persistence::data_stats(&store).await.unwrap();
    assert_eq!(stats.track_count, 2);
    assert_eq!(stats.total_points, 3);
    assert!(!target.state().export_enabled());
}

#[tokio::test]
async fn test_invalid_document_keeps_local_data() {
    let store = store();
    let (mut recorder, _feed) = idle_recorder(&store);
    record_session(&store, 2, 1).await;
    let before = persistence::data_stats(&store).await.unwrap();

    let sync = engine(Arc::new(MemoryRemote::new()), &store);
    let bad = RemoteDocument::new("broken", json!({ "name": 7, "tracks": "nope" }));
    let result = sync.import_document(recorder.state_mut(), &bad).await;

    assert!(matches!(
        result,
        Err(Error::Remote(RemoteError::InvalidDocument(_)))
    ));
    assert_eq!(persistence::data_stats(&store).await.unwrap(), before);
}

#[tokio::test]
async fn test_import_empty_collection() {
    let store = store();
    let (mut recorder, _feed) = idle_recorder(&store);
    let sync = engine(Arc::new(MemoryRemote::new()), &store);
    let outcome = sync
        .import(recorder.state_mut(), &mut ScriptedPrompt::new())
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::NoDocuments);
}

#[tokio::test]
async fn test_import_refused_while_recording() {
    let store = store();
    let (mut recorder, _feed) = idle_recorder(&store);
    recorder
        .start(&mut ScriptedPrompt::new())
        .await
        .unwrap();

    let remote = Arc::new(MemoryRemote::new());
    remote.insert_document("projects", "x", json!({})).await;
    let sync = engine(remote, &store);
    let result = sync
        .import(
            recorder.state_mut(),
            &mut ScriptedPrompt::new().then_choose(Some(0)),
        )
        .await;
    assert!(matches!(result, Err(Error::AlreadyRecording)));
}

#[tokio::test]
async fn test_documents_listed_newest_first() {
    let store = store();
    let remote = Arc::new(MemoryRemote::new());
    for (id, offset) in [("old", 0), ("new", 3600), ("mid", 60)] {
        let created = at(offset).format(&Rfc3339).unwrap();
        remote
            .insert_document("projects", id, json!({ "name": id, "createdAt": created }))
            .await;
    }
    remote.insert_document("projects", "undated", json!({})).await;

    let ids: Vec<String> = engine(remote, &store)
        .list_documents()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, ["new", "mid", "old", "undated"]);
}

// =============================================================================
// Directory remote
// =============================================================================

#[tokio::test]
async fn test_round_trip_through_directory() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(DirectoryRemote::new(dir.path()).unwrap());

    let source_store = store();
    let recorder = record_session(&source_store, 3, 2).await;
    let report = engine(remote.clone(), &source_store)
        .export_as(recorder.state(), "disk walk")
        .await
        .unwrap();
    assert_eq!(report.uploaded, 2);

    let target_store = store();
    let (mut target, _feed) = idle_recorder(&target_store);
    let sync = engine(remote, &target_store);
    let doc = sync.list_documents().await.unwrap().remove(0);
    assert_eq!(doc.display_name(), "disk walk");

    let report = sync.import_document(target.state_mut(), &doc).await.unwrap();
    assert_eq!(report.total_points, 3);
    assert_eq!(report.imported_photos, 2);

    let photos = target_store
        .lock()
        .await
        .query_photos(&Default::default())
        .unwrap();
    assert!(photos.iter().all(|p| p.photo.direction == Some(Direction::Up)));
    assert!(photos.iter().any(|p| p.photo.timestamp == at(0)));
}

// =============================================================================
// Reference points
// =============================================================================

#[tokio::test]
async fn test_reference_points_both_shapes() {
    let store = store();
    let remote = Arc::new(MemoryRemote::new());
    remote
        .insert_document(
            "projects",
            "OfficialPoints",
            json!({
                "points": [
                    ["P1", "Shrine", 34.851, 135.471, 80],
                    { "pointID": "P2", "name": "Bridge", "latitude": "34.852", "longitude": "135.472" },
                    { "id": "P3", "lat": 34.853, "lng": 135.473 },
                    { "id": "P4", "name": "unplaced" },
                ]
            }),
        )
        .await;
    remote
        .insert_document("projects", "walk", json!({ "name": "walk" }))
        .await;
    let sync = engine(remote, &store);

    let points = sync.load_reference_points().await.unwrap().unwrap();
    let ids: Vec<_> = points.iter().map(|p| p.id.as_deref().unwrap()).collect();
    assert_eq!(ids, ["P1", "P2", "P3"]);
    assert_eq!(points[0].elevation, Some(80.0));
    assert_eq!(points[1].point(), GeoPoint::new(34.852, 135.472));
    assert_eq!(points[2].name, None);

    // the reference document is not offered as a session
    let listed: Vec<String> = sync
        .list_documents()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(listed, ["walk"]);
}

#[tokio::test]
async fn test_reference_points_absent() {
    let store = store();
    let sync = engine(Arc::new(MemoryRemote::new()), &store);
    assert!(sync.load_reference_points().await.unwrap().is_none());
}
