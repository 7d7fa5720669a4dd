//! Geographic primitives: points, great-circle distance and the shared
//! location index.

pub mod index;

pub use index::{GeoIndex, MemoryGeoIndex};

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Earth radius in meters, the same constant Redis GEO commands use so radius
/// queries and pairwise checks agree on borderline points.
pub const EARTH_RADIUS_M: f64 = 6_372_797.560856;

/// A WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject coordinates outside the valid latitude/longitude ranges.
    pub fn validated(latitude: f64, longitude: f64) -> Result<Self, ChatError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ChatError::Invalid(
                "Latitude must be between -90 and 90".to_string(),
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ChatError::Invalid(
                "Longitude must be between -180 and 180".to_string(),
            ));
        }
        Ok(Self::new(latitude, longitude))
    }

    /// Haversine distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    /// Whether `other` lies within `radius_m` meters of this point (inclusive).
    pub fn within(&self, other: &GeoPoint, radius_m: f64) -> bool {
        self.distance_to(other) <= radius_m
    }
}

/// Latitude offset in degrees that corresponds to `meters` due north.
/// Handy for placing test users at known distances.
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = GeoPoint::new(45.5, -73.6);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_distance_north_offset() {
        let origin = GeoPoint::new(0.0, 0.0);
        let north = GeoPoint::new(meters_to_lat_degrees(500.0), 0.0);
        let d = origin.distance_to(&north);
        assert!((d - 500.0).abs() < 0.01, "got {d}");
        assert!(origin.within(&north, 500.5));
        assert!(!origin.within(&north, 100.0));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = GeoPoint::new(40.7306, -73.9352);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_validated_rejects_out_of_range() {
        assert!(GeoPoint::validated(91.0, 0.0).is_err());
        assert!(GeoPoint::validated(0.0, -180.5).is_err());
        assert!(GeoPoint::validated(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::validated(-90.0, 180.0).is_ok());
    }
}
