//! Main store implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use walklog_types::{GeoPoint, LastPosition, Photo, Track, Waypoint};

use crate::error::{Error, Result};
use crate::models::{DataStats, StoredPhoto, StoredTrack};
use crate::queries::PhotoQuery;
use crate::schema;

/// Settings key under which the last map position is stored.
pub const LAST_POSITION_KEY: &str = "lastPosition";

/// SQLite-based store for tracks, photos and settings.
///
/// The connection can be closed and reopened in place; every operation on
/// a closed store fails with [`Error::Closed`].
pub struct Store {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    busy_timeout: Option<Duration>,
}

fn connect(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            info!("Opening database at {}", path.display());
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            conn
        }
        None => Connection::open_in_memory()?,
    };

    schema::initialize(&conn)?;
    Ok(conn)
}

pub(crate) fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> std::result::Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(Some(&path))?;
        Ok(Self {
            conn: Some(conn),
            path: Some(path),
            busy_timeout: None,
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    ///
    /// Reopening an in-memory store yields a fresh, empty database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Some(connect(None)?),
            path: None,
            busy_timeout: None,
        })
    }

    /// Location of the database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(Error::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Cheap round trip proving the connection is usable.
    pub fn ping(&self) -> Result<()> {
        self.conn()?.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Close the connection. The store stays usable through [`Store::reopen`].
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| Error::from(e))?;
            debug!("Database connection closed");
        }
        Ok(())
    }

    /// Drop the current connection, if any, and connect again.
    pub fn reopen(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take()
            && let Err((_, e)) = conn.close()
        {
            warn!("Error closing stale database connection: {}", e);
        }
        let conn = connect(self.path.as_deref())?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        self.conn = Some(conn);
        info!("Database connection reopened");
        Ok(())
    }

    /// How long to wait on a lock held by another connection before failing with [`Error::Busy`].
    ///
    /// The timeout is kept across [`Store::reopen`].
    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.conn()?.busy_timeout(timeout)?;
        self.busy_timeout = Some(timeout);
        Ok(())
    }
}

// Track operations
impl Store {
    /// Create an empty track and return its id.
    pub fn create_track(&self, start_timestamp: &str) -> Result<i64> {
        self.insert_track(&Track::new(start_timestamp))
    }

    /// Insert a complete track under a new id.
    pub fn insert_track(&self, track: &Track) -> Result<i64> {
        let conn = self.conn()?;
        let points = serde_json::to_string(track.points())?;

        conn.execute(
            "INSERT INTO tracks (start_timestamp, points, total_points, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                track.start_timestamp(),
                points,
                track.total_points() as i64,
                OffsetDateTime::now_utc().unix_timestamp()
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted track {} with {} points", id, track.total_points());
        Ok(id)
    }

    /// Overwrite the track stored under `id`, creating the row if it is missing.
    pub fn save_track(&self, id: i64, track: &Track) -> Result<()> {
        let points = serde_json::to_string(track.points())?;

        self.conn()?.execute(
            "INSERT INTO tracks (id, start_timestamp, points, total_points, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                start_timestamp = ?2,
                points = ?3,
                total_points = ?4,
                updated_at = ?5",
            params![
                id,
                track.start_timestamp(),
                points,
                track.total_points() as i64,
                OffsetDateTime::now_utc().unix_timestamp()
            ],
        )?;

        debug!("Saved track {} ({} points)", id, track.total_points());
        Ok(())
    }

    pub fn get_track(&self, id: i64) -> Result<Option<StoredTrack>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, start_timestamp, points FROM tracks WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(track_from_parts).transpose()
    }

    /// All tracks in creation order.
    pub fn list_tracks(&self) -> Result<Vec<StoredTrack>> {
        let mut stmt = self
            .conn()?
            .prepare("SELECT id, start_timestamp, points FROM tracks ORDER BY id ASC")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<(i64, String, String)>, _>>()?;

        rows.into_iter().map(track_from_parts).collect()
    }

    /// The most recently created track.
    pub fn latest_track(&self) -> Result<Option<StoredTrack>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, start_timestamp, points FROM tracks ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(track_from_parts).transpose()
    }

    /// Delete a track. Fails with [`Error::TrackNotFound`] if it does not exist.
    pub fn delete_track(&self, id: i64) -> Result<()> {
        let changed = self.conn()?.execute("DELETE FROM tracks WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::TrackNotFound(id));
        }
        debug!("Deleted track {}", id);
        Ok(())
    }
}

fn track_from_parts((id, start_timestamp, points): (i64, String, String)) -> Result<StoredTrack> {
    let points: Vec<Waypoint> = serde_json::from_str(&points)?;
    let track = Track::from_points(start_timestamp, points)?;
    Ok(StoredTrack { id, track })
}

// Photo operations
impl Store {
    /// Insert a photo and return its id.
    pub fn insert_photo(&self, photo: &Photo) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO photos (timestamp_ms, direction, lat, lng, heading, text, data,
             remote_url, storage_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                to_millis(photo.timestamp),
                photo.direction.map(|d| d.as_str()),
                photo.location.map(|p| p.lat),
                photo.location.map(|p| p.lng),
                photo.heading,
                photo.text,
                photo.data.as_ref(),
                photo.remote_url,
                photo.storage_path,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted photo {} ({} bytes)", id, photo.size());
        Ok(id)
    }

    pub fn get_photo(&self, id: i64) -> Result<Option<StoredPhoto>> {
        let photo = self
            .conn()?
            .query_row(
                "SELECT id, timestamp_ms, direction, lat, lng, heading, text, data,
                 remote_url, storage_path FROM photos WHERE id = ?",
                [id],
                photo_from_row,
            )
            .optional()?;

        Ok(photo)
    }

    /// Query photos with filters.
    pub fn query_photos(&self, query: &PhotoQuery) -> Result<Vec<StoredPhoto>> {
        let sql = query.build_sql();
        debug!("Executing query: {}", sql);

        let mut stmt = self.conn()?.prepare(&sql)?;
        let photos = stmt
            .query_map([], photo_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(photos)
    }

    /// Record where an uploaded photo now lives remotely.
    pub fn set_photo_remote(&self, id: i64, remote_url: &str, storage_path: &str) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE photos SET remote_url = ?2, storage_path = ?3 WHERE id = ?1",
            params![id, remote_url, storage_path],
        )?;

        if updated == 0 {
            return Err(Error::PhotoNotFound(id));
        }
        Ok(())
    }

    pub fn count_photos(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn photo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredPhoto> {
    let timestamp = from_millis(row.get(1)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e)))?;

    let direction = row
        .get::<_, Option<String>>(2)?
        .and_then(|s| match s.parse() {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Ignoring stored photo direction: {}", e);
                None
            }
        });

    let location = match (row.get::<_, Option<f64>>(3)?, row.get::<_, Option<f64>>(4)?) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    };

    Ok(StoredPhoto {
        id: row.get(0)?,
        photo: Photo {
            data: Bytes::from(row.get::<_, Vec<u8>>(7)?),
            timestamp,
            direction,
            location,
            heading: row.get(5)?,
            text: row.get(6)?,
            remote_url: row.get(8)?,
            storage_path: row.get(9)?,
        },
    })
}

// Settings operations
impl Store {
    /// Store a JSON-serializable value under `key`, replacing any previous value.
    pub fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, json],
        )?;
        Ok(())
    }

    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let json: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;

        json.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(Error::from)
    }

    pub fn save_last_position(&self, position: &LastPosition) -> Result<()> {
        self.put_setting(LAST_POSITION_KEY, position)?;
        debug!(
            "Saved last position {:.5}, {:.5} (zoom {})",
            position.lat, position.lng, position.zoom
        );
        Ok(())
    }

    pub fn last_position(&self) -> Result<Option<LastPosition>> {
        self.get_setting(LAST_POSITION_KEY)
    }
}

// Whole-store operations
impl Store {
    /// Counts and sizes of everything stored.
    pub fn data_stats(&self) -> Result<DataStats> {
        let conn = self.conn()?;

        let (track_count, total_points, gps_bytes): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_points), 0), COALESCE(SUM(LENGTH(points)), 0)
             FROM tracks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let (photo_count, photo_bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(data)), 0) FROM photos",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DataStats {
            track_count: track_count as usize,
            total_points: total_points as usize,
            gps_bytes: gps_bytes as u64,
            photo_count: photo_count as usize,
            photo_bytes: photo_bytes as u64,
        })
    }

    /// Delete every track, photo and setting in one transaction.
    ///
    /// The last map position survives the wipe; when none was stored,
    /// `fallback` is written in its place. Row ids restart from 1.
    /// Returns the position that was kept.
    ///
    /// Fails with [`Error::Busy`] when another connection holds the write
    /// lock for longer than the busy timeout. Nothing is deleted in that case.
    pub fn wipe(&mut self, fallback: &LastPosition) -> Result<LastPosition> {
        let kept = match self.last_position() {
            Ok(Some(position)) => position,
            Ok(None) => *fallback,
            Err(e @ (Error::Busy(_) | Error::Closed)) => return Err(e),
            Err(e) => {
                warn!("Stored last position unreadable, using fallback: {}", e);
                *fallback
            }
        };
        let kept_json = serde_json::to_string(&kept)?;

        let conn = self.conn_mut()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM tracks;
             DELETE FROM photos;
             DELETE FROM settings;
             DELETE FROM sqlite_sequence WHERE name IN ('tracks', 'photos');",
        )?;
        tx.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)",
            params![LAST_POSITION_KEY, kept_json],
        )?;
        tx.commit()?;

        info!("Local data cleared");
        Ok(kept)
    }
}
