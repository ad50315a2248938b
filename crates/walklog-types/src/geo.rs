//! Spherical-earth geodesy helpers.
//!
//! All functions treat the earth as a sphere of radius [`EARTH_RADIUS_M`].
//! That is accurate to well under a percent for the short hops between
//! consecutive GPS fixes, which is all the recorder needs.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Number of recent points averaged when estimating a heading from history.
pub const HEADING_HISTORY_POINTS: usize = 3;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Round both coordinates to 5 decimal places (about 1.1 m).
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            lat: round_to(self.lat, 5),
            lng: round_to(self.lng, 5),
        }
    }
}

/// Round `value` to `decimals` decimal places.
///
/// ```
/// use walklog_types::geo::round_to;
///
/// assert_eq!(round_to(35.6812345, 5), 35.68123);
/// assert_eq!(round_to(4.56, 1), 4.6);
/// ```
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Great-circle distance in meters between two points.
///
/// ```
/// use walklog_types::geo::{GeoPoint, haversine_distance};
///
/// let a = GeoPoint::new(0.0, 0.0);
/// assert_eq!(haversine_distance(&a, &a), 0.0);
/// ```
#[must_use]
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees `[0, 360)` from `from` to `to`, clockwise from north.
#[must_use]
pub fn bearing(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    let degrees = y.atan2(x).to_degrees();
    let normalized = (degrees + 360.0) % 360.0;
    // (-0.0 + 360) % 360 can land exactly on 360 after rounding
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Arithmetic mean of a set of points, or `None` when empty.
#[must_use]
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Some(GeoPoint::new(lat / n, lng / n))
}

/// Estimate the travel heading at `end` from the track history.
///
/// The bearing is taken from the centroid of the last
/// [`HEADING_HISTORY_POINTS`] entries of `history` to `end`. `history` may
/// already end with `end` itself, as a restored track does; it then counts
/// as one of the averaged points. Returns `0.0` when `history` is empty.
#[must_use]
pub fn estimate_heading(end: &GeoPoint, history: &[GeoPoint]) -> f64 {
    let recent = &history[history.len().saturating_sub(HEADING_HISTORY_POINTS)..];
    match centroid(recent) {
        Some(center) => bearing(&center, end),
        None => 0.0,
    }
}
