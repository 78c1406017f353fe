use crate::location::{AuthorizationStatus, LocationFix, LocationProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::{Duration, UNIX_EPOCH};

/// Provider that replays a fixed list of fixes with no pacing.
#[derive(Debug)]
pub struct ScriptedProvider {
    authorization: AuthorizationStatus,
    fixes: VecDeque<LocationFix>,
}

impl ScriptedProvider {
    pub fn new(authorization: AuthorizationStatus, fixes: Vec<LocationFix>) -> Self {
        Self {
            authorization,
            fixes: fixes.into(),
        }
    }

    pub fn authorized(fixes: Vec<LocationFix>) -> Self {
        Self::new(AuthorizationStatus::AuthorizedWhenInUse, fixes)
    }

    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    fn authorization(&self) -> AuthorizationStatus {
        self.authorization
    }

    async fn next_fix(&mut self) -> Option<LocationFix> {
        self.fixes.pop_front()
    }
}

/// Build a fix with good accuracy at the given position and speed (m/s).
/// `second` offsets the timestamp from the epoch.
pub fn fix_at(latitude: f64, longitude: f64, speed_mps: f64, second: u64) -> LocationFix {
    LocationFix {
        latitude,
        longitude,
        horizontal_accuracy_m: 5.0,
        speed_accuracy: 0.5,
        raw_speed_mps: speed_mps,
        timestamp: UNIX_EPOCH + Duration::from_secs(second),
    }
}

/// Fixes moving due north from `start_latitude` at a steady speed, one per second.
pub fn northbound_track(
    start_latitude: f64,
    longitude: f64,
    speed_mps: f64,
    count: usize,
) -> Vec<LocationFix> {
    // metres per degree of latitude on the haversine sphere
    let metres_per_degree = 6_371_000.0_f64.to_radians();
    (0..count)
        .map(|i| {
            let latitude = start_latitude + (speed_mps * i as f64) / metres_per_degree;
            fix_at(latitude, longitude, speed_mps, i as u64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_yields_fixes_in_order_then_ends() {
        let mut provider =
            ScriptedProvider::authorized(vec![fix_at(1.0, 2.0, 3.0, 0), fix_at(1.5, 2.0, 4.0, 1)]);

        let first = provider.next_fix().await.expect("first fix");
        let second = provider.next_fix().await.expect("second fix");

        assert_eq!(first.raw_speed_mps, 3.0);
        assert_eq!(second.latitude, 1.5);
        assert!(provider.next_fix().await.is_none());
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn northbound_track_spacing_matches_speed() {
        let track = northbound_track(45.0, 7.0, 20.0, 3);

        let step = track[0].coordinate().distance_to(&track[1].coordinate());

        assert!((step - 20.0).abs() < 0.01, "got {step}");
    }
}
