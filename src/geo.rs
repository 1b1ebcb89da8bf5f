//! Distance and decay kernels.
//!
//! Every similarity dimension maps a raw difference through the same
//! exponential decay, so scores fall off smoothly and never reach exactly 0
//! for a finite difference.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build a point only when both coordinates are present and finite.
    #[must_use]
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Self { lat, lon }),
            _ => None,
        }
    }
}

/// Great-circle distance between two points, in kilometers.
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// `exp(-|delta| / scale)`: 1 at zero difference, decaying toward 0.
///
/// Larger `scale` decays more slowly.
#[inline]
#[must_use]
pub fn exp_decay(delta: f64, scale: f64) -> f64 {
    (-delta.abs() / scale).exp()
}

/// `|a - b| / max(a, b)` for positive values.
#[inline]
#[must_use]
pub fn relative_difference(a: f64, b: f64) -> f64 {
    (a - b).abs() / a.max(b)
}
