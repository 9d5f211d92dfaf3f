//! Geodesic helpers shared by the search engine and storage backends.
//!
//! Distances are great-circle (haversine) distances on a spherical earth.
//! The radius filter is inclusive at meter resolution: a point whose rounded
//! distance equals the rounded radius is inside.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude.
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
  pub lat: f64,
  pub lon: f64,
}

impl GeoPosition {
  pub fn validate(&self) -> Result<()> {
    let ok = self.lat.is_finite()
      && self.lon.is_finite()
      && (-90.0..=90.0).contains(&self.lat)
      && (-180.0..=180.0).contains(&self.lon);
    if ok {
      Ok(())
    } else {
      Err(Error::InvalidPosition { lat: self.lat, lon: self.lon })
    }
  }

  /// Haversine distance to `other`, in meters.
  pub fn distance_m(&self, other: &GeoPosition) -> f64 {
    let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (other.lon - self.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
      + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
  }
}

/// Rounded distance in whole meters, as reported in search results.
pub fn round_meters(distance_m: f64) -> u64 { distance_m.round().max(0.0) as u64 }

/// Inclusive radius check at meter resolution.
pub fn within_radius(distance_m: f64, radius_km: f64) -> bool {
  round_meters(distance_m) <= round_meters(radius_km * 1000.0)
}

/// A lat/lon rectangle enclosing every point within a radius. Used by
/// backends as a cheap index-friendly prefilter before the exact check.
///
/// When the radius crosses the antimeridian the longitude range wraps and
/// `min_lon > max_lon`: the box then covers `lon >= min_lon` or
/// `lon <= max_lon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub min_lat: f64,
  pub max_lat: f64,
  pub min_lon: f64,
  pub max_lon: f64,
}

impl BoundingBox {
  pub fn around(center: &GeoPosition, radius_km: f64) -> Self {
    // One extra meter so rounding at the boundary never drops a point.
    let radius_m = radius_km * 1000.0 + 1.0;
    let d_lat = radius_m / METERS_PER_DEGREE;
    let min_lat = (center.lat - d_lat).max(-90.0);
    let max_lat = (center.lat + d_lat).min(90.0);

    // Longitude degrees shrink with latitude; near the poles take everything.
    let widest = min_lat.abs().max(max_lat.abs()).to_radians().cos();
    let (min_lon, max_lon) = if widest <= 1e-6 {
      (-180.0, 180.0)
    } else {
      let d_lon = radius_m / (METERS_PER_DEGREE * widest);
      let (west, east) = (center.lon - d_lon, center.lon + d_lon);
      if d_lon >= 180.0 {
        (-180.0, 180.0)
      } else if west < -180.0 {
        (west + 360.0, east)
      } else if east > 180.0 {
        (west, east - 360.0)
      } else {
        (west, east)
      }
    };

    Self { min_lat, max_lat, min_lon, max_lon }
  }

  pub fn crosses_antimeridian(&self) -> bool { self.min_lon > self.max_lon }

  pub fn contains(&self, p: &GeoPosition) -> bool {
    let lon_ok = if self.crosses_antimeridian() {
      p.lon >= self.min_lon || p.lon <= self.max_lon
    } else {
      (self.min_lon..=self.max_lon).contains(&p.lon)
    };
    (self.min_lat..=self.max_lat).contains(&p.lat) && lon_ok
  }
}
