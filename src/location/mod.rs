use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

pub mod mock;
pub mod replay;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// One raw observation from the platform location provider.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy_m: f64,
    pub speed_accuracy: f64,
    pub raw_speed_mps: f64,
    pub timestamp: SystemTime,
}

impl LocationFix {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Denied,
    Restricted,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("failed to read location replay: {0}")]
    Read(#[from] std::io::Error),
    #[error("location replay contains no usable fixes")]
    Empty,
}

/// Source of location fixes. Delivery is serialized: the pipeline awaits one
/// fix at a time.
#[async_trait]
pub trait LocationProvider: Send {
    fn authorization(&self) -> AuthorizationStatus;

    /// Next fix, or `None` once the stream has ended.
    async fn next_fix(&mut self) -> Option<LocationFix>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_identical_points_is_zero() {
        let point = Coordinate::new(48.8566, 2.3522);

        assert_eq!(point.distance_to(&point), 0.0);
    }

    #[test]
    fn distance_matches_known_city_pair() {
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);

        let km = paris.distance_to(&london) / 1000.0;

        assert!((km - 343.5).abs() < 2.0, "got {km}");
    }

    #[test]
    fn one_millidegree_of_latitude_is_about_111_metres() {
        let a = Coordinate::new(45.0, 7.0);
        let b = Coordinate::new(45.001, 7.0);

        let metres = a.distance_to(&b);

        assert!((metres - 111.2).abs() < 0.5, "got {metres}");
    }

    #[test]
    fn coordinate_validity_rejects_out_of_range_and_nan() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn only_authorized_variants_are_authorized() {
        assert!(AuthorizationStatus::AuthorizedAlways.is_authorized());
        assert!(AuthorizationStatus::AuthorizedWhenInUse.is_authorized());
        assert!(!AuthorizationStatus::NotDetermined.is_authorized());
        assert!(!AuthorizationStatus::Denied.is_authorized());
        assert!(!AuthorizationStatus::Restricted.is_authorized());
    }
}
