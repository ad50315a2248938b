//! Photo gallery listing.

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};
use time::OffsetDateTime;

use walklog_core::persistence;
use walklog_store::{PhotoQuery, StoredPhoto};
use walklog_types::{Direction, GeoPoint};

use crate::cli::OutputFormat;
use crate::commands::{Output, open_store};
use crate::config::Config;
use crate::style::format_data_size;

#[derive(Debug, Tabled)]
struct PhotoRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Taken (UTC)")]
    taken: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Uploaded")]
    uploaded: &'static str,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&StoredPhoto> for PhotoRow {
    fn from(stored: &StoredPhoto) -> Self {
        let photo = &stored.photo;
        let t = photo.timestamp;
        Self {
            id: stored.id,
            taken: format!(
                "{} {:02}:{:02}:{:02}",
                t.date(),
                t.hour(),
                t.minute(),
                t.second()
            ),
            direction: photo
                .direction
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
            location: photo
                .location
                .map_or_else(|| "-".to_string(), |p| format!("{:.5}, {:.5}", p.lat, p.lng)),
            size: format_data_size(photo.data.len() as u64),
            uploaded: if stored.is_uploaded() { "yes" } else { "no" },
            note: photo.text.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PhotoJson<'a> {
    id: i64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    direction: Option<Direction>,
    location: Option<GeoPoint>,
    heading: Option<f64>,
    text: Option<&'a str>,
    bytes: usize,
    uploaded: bool,
    remote_url: Option<&'a str>,
}

impl<'a> From<&'a StoredPhoto> for PhotoJson<'a> {
    fn from(stored: &'a StoredPhoto) -> Self {
        let photo = &stored.photo;
        Self {
            id: stored.id,
            timestamp: photo.timestamp,
            direction: photo.direction,
            location: photo.location,
            heading: photo.heading,
            text: photo.text.as_deref(),
            bytes: photo.data.len(),
            uploaded: stored.is_uploaded(),
            remote_url: photo.remote_url.as_deref(),
        }
    }
}

pub async fn cmd_photos(
    format: OutputFormat,
    limit: Option<u32>,
    pending: bool,
    config: &Config,
    out: Output,
) -> Result<()> {
    let store = open_store(config)?;
    persistence::ensure_available(&store).await?;

    let mut query = PhotoQuery::new();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if pending {
        query = query.uploaded(false);
    }
    let photos = store
        .lock()
        .await
        .query_photos(&query)
        .context("Failed to read photos")?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<PhotoJson<'_>> = photos.iter().map(PhotoJson::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text if photos.is_empty() => out.info("No photos stored"),
        OutputFormat::Text => {
            let rows: Vec<PhotoRow> = photos.iter().map(PhotoRow::from).collect();
            let mut table = Table::new(&rows);
            table.with(Style::rounded());
            println!("{}", table);
            out.info(&format!("{} photo(s), newest first", rows.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use walklog_types::Photo;

    fn stored(id: i64) -> StoredPhoto {
        let timestamp = OffsetDateTime::from_unix_timestamp(1_740_819_900).unwrap();
        let mut photo = Photo::new(vec![0u8; 2048].into(), timestamp);
        photo.direction = Some(Direction::Left);
        photo.location = Some(GeoPoint::new(34.85, 135.47));
        photo.text = Some("gate".to_string());
        StoredPhoto { id, photo }
    }

    #[test]
    fn test_photo_row() {
        let row = PhotoRow::from(&stored(3));
        assert_eq!(row.id, 3);
        assert_eq!(row.taken, "2025-03-01 09:05:00");
        assert_eq!(row.direction, "left");
        assert_eq!(row.location, "34.85000, 135.47000");
        assert_eq!(row.size, "2 KB");
        assert_eq!(row.uploaded, "no");
        assert_eq!(row.note, "gate");
    }

    #[test]
    fn test_photo_row_without_metadata() {
        let mut photo = stored(1);
        photo.photo.direction = None;
        photo.photo.location = None;
        photo.photo.text = None;
        photo.photo.storage_path = Some("projects/a/photos/1.jpg".to_string());
        let row = PhotoRow::from(&photo);
        assert_eq!(row.direction, "-");
        assert_eq!(row.location, "-");
        assert_eq!(row.uploaded, "yes");
        assert_eq!(row.note, "");
    }

    #[test]
    fn test_photo_json_fields() {
        let photo = stored(5);
        let value = serde_json::to_value(PhotoJson::from(&photo)).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["timestamp"], "2025-03-01T09:05:00Z");
        assert_eq!(value["direction"], "left");
        assert_eq!(value["location"]["lat"], 34.85);
        assert_eq!(value["bytes"], 2048);
        assert_eq!(value["uploaded"], false);
    }
}
