//! Reference points published alongside exported sessions.
//!
//! A document with the id [`REFERENCE_POINTS_ID`] in the session collection
//! holds a `points` array of landmarks to show on the map. Entries come in
//! two shapes:
//!
//! - arrays: `[id, name, lat, lng, elevation]`
//! - objects with aliased keys: `pointID` or `id`, `name`, `latitude` or
//!   `lat`, `longitude` or `lng`
//!
//! Coordinates may be JSON numbers or numeric strings. Entries without a
//! usable latitude and longitude are skipped.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use walklog_types::GeoPoint;

/// Document id of the reference point list.
pub const REFERENCE_POINTS_ID: &str = "OfficialPoints";

const ID_KEYS: &[&str] = &["pointID", "id", "ポイントID"];
const NAME_KEYS: &[&str] = &["name", "名称"];
const LAT_KEYS: &[&str] = &["latitude", "lat", "緯度"];
const LNG_KEYS: &[&str] = &["longitude", "lng", "経度"];
const ELEVATION_KEYS: &[&str] = &["elevation", "elev"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferencePoint {
    pub id: Option<String>,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub elevation: Option<f64>,
}

impl ReferencePoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Parse one entry of the `points` array.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(fields) => Some(Self {
                id: fields.first().and_then(text),
                name: fields.get(1).and_then(text),
                lat: fields.get(2).and_then(number)?,
                lng: fields.get(3).and_then(number)?,
                elevation: fields.get(4).and_then(number),
            }),
            Value::Object(_) => Some(Self {
                id: first_of(value, ID_KEYS).and_then(text),
                name: first_of(value, NAME_KEYS).and_then(text),
                lat: first_of(value, LAT_KEYS).and_then(number)?,
                lng: first_of(value, LNG_KEYS).and_then(number)?,
                elevation: first_of(value, ELEVATION_KEYS).and_then(number),
            }),
            _ => None,
        }
    }
}

/// Every usable point in the data of a reference document.
pub fn parse_points(data: &Value) -> Vec<ReferencePoint> {
    let Some(entries) = data.get("points").and_then(Value::as_array) else {
        return Vec::new();
    };
    let points: Vec<ReferencePoint> = entries
        .iter()
        .filter_map(ReferencePoint::from_value)
        .collect();
    if points.len() < entries.len() {
        debug!(
            "Skipped {} reference points without coordinates",
            entries.len() - points.len()
        );
    }
    points
}

fn first_of<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_entry() {
        let point = ReferencePoint::from_value(&json!(["P01", "Summit", 34.85, "135.47", 120.5]))
            .unwrap();
        assert_eq!(point.id.as_deref(), Some("P01"));
        assert_eq!(point.name.as_deref(), Some("Summit"));
        assert_eq!(point.point(), GeoPoint::new(34.85, 135.47));
        assert_eq!(point.elevation, Some(120.5));
    }

    #[test]
    fn test_object_entry_aliases() {
        let long = ReferencePoint::from_value(&json!({
            "pointID": 7,
            "name": "Gate",
            "latitude": "34.1",
            "longitude": 135.2,
        }))
        .unwrap();
        assert_eq!(long.id.as_deref(), Some("7"));
        assert_eq!(long.point(), GeoPoint::new(34.1, 135.2));
        assert_eq!(long.elevation, None);

        let short = ReferencePoint::from_value(&json!({ "id": "B", "lat": 1.0, "lng": 2.0 }))
            .unwrap();
        assert_eq!(short.id.as_deref(), Some("B"));
        assert_eq!(short.name, None);
        assert_eq!(short.point(), GeoPoint::new(1.0, 2.0));
    }

    #[test]
    fn test_entries_without_coordinates_are_skipped() {
        let data = json!({
            "points": [
                ["A", "ok", 1.0, 2.0],
                ["B", "no lng", 1.0],
                ["C", "text", "north", 2.0],
                { "id": "D", "lat": null, "lng": 2.0 },
                { "id": "E", "lat": "NaN", "lng": 2.0 },
                "garbage",
                { "name": "ok too", "lat": 3.0, "lng": 4.0 },
            ]
        });
        let points = parse_points(&data);
        let names: Vec<_> = points.iter().map(|p| p.name.as_deref()).collect();
        assert_eq!(names, [Some("ok"), Some("ok too")]);
    }

    #[test]
    fn test_missing_points_array() {
        assert!(parse_points(&json!({})).is_empty());
        assert!(parse_points(&json!({ "points": "nope" })).is_empty());
    }
}
