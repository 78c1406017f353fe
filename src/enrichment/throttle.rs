use crate::location::Coordinate;
use std::time::{Duration, Instant};

/// Limits for one gated remote operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleConfig {
    pub min_interval: Duration,
    pub min_distance_m: f64,
    /// Fixes whose accuracy radius is at or above this never trigger a query.
    pub accuracy_ceiling_m: f64,
}

impl ThrottleConfig {
    pub const fn speed_limit() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            min_distance_m: 100.0,
            accuracy_ceiling_m: 50.0,
        }
    }

    pub const fn geocode() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            min_distance_m: 50.0,
            accuracy_ceiling_m: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrottleState {
    pub last_query_time: Option<Instant>,
    pub last_query_location: Option<Coordinate>,
}

/// Time/distance/accuracy gate in front of a remote lookup. Each lookup kind
/// owns its own gate.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    config: ThrottleConfig,
    state: ThrottleState,
}

impl ThrottleGate {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: ThrottleState::default(),
        }
    }

    pub fn should_proceed(&self, now: Instant, location: &Coordinate, accuracy_m: f64) -> bool {
        if let Some(last_time) = self.state.last_query_time
            && now.saturating_duration_since(last_time) < self.config.min_interval
        {
            return false;
        }
        if let Some(last_location) = self.state.last_query_location.as_ref()
            && location.distance_to(last_location) < self.config.min_distance_m
        {
            return false;
        }
        // NaN accuracy fails this comparison too
        accuracy_m.is_finite() && accuracy_m >= 0.0 && accuracy_m < self.config.accuracy_ceiling_m
    }

    /// Call only when a query is actually issued.
    pub fn record_attempt(&mut self, now: Instant, location: Coordinate) {
        self.state.last_query_time = Some(now);
        self.state.last_query_location = Some(location);
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn state(&self) -> &ThrottleState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Coordinate = Coordinate {
        latitude: 45.0,
        longitude: 7.0,
    };

    fn north_of_base(metres: f64) -> Coordinate {
        let metres_per_degree = 6_371_000.0_f64.to_radians();
        Coordinate::new(BASE.latitude + metres / metres_per_degree, BASE.longitude)
    }

    #[test]
    fn first_query_proceeds_when_accuracy_is_good() {
        let gate = ThrottleGate::new(ThrottleConfig::speed_limit());

        assert!(gate.should_proceed(Instant::now(), &BASE, 10.0));
    }

    #[test]
    fn blocked_right_after_recording_at_same_place() {
        let mut gate = ThrottleGate::new(ThrottleConfig::speed_limit());
        let now = Instant::now();
        gate.record_attempt(now, BASE);

        assert!(!gate.should_proceed(now, &BASE, 10.0));
    }

    #[test]
    fn requires_both_interval_and_distance() {
        let mut gate = ThrottleGate::new(ThrottleConfig::speed_limit());
        let start = Instant::now();
        gate.record_attempt(start, BASE);
        let later = start + Duration::from_secs(10);
        let far = north_of_base(150.0);

        assert!(!gate.should_proceed(start + Duration::from_secs(9), &far, 10.0));
        assert!(!gate.should_proceed(later, &north_of_base(60.0), 10.0));
        assert!(gate.should_proceed(later, &far, 10.0));
    }

    #[test]
    fn accuracy_at_or_above_ceiling_blocks() {
        let gate = ThrottleGate::new(ThrottleConfig::speed_limit());
        let now = Instant::now();

        assert!(!gate.should_proceed(now, &BASE, 50.0));
        assert!(!gate.should_proceed(now, &BASE, 75.0));
        assert!(!gate.should_proceed(now, &BASE, f64::NAN));
        assert!(gate.should_proceed(now, &BASE, 49.9));
    }

    #[test]
    fn gates_do_not_share_state() {
        let mut speed_gate = ThrottleGate::new(ThrottleConfig::speed_limit());
        let geocode_gate = ThrottleGate::new(ThrottleConfig::geocode());
        let now = Instant::now();
        speed_gate.record_attempt(now, BASE);

        assert!(!speed_gate.should_proceed(now, &BASE, 10.0));
        assert!(geocode_gate.should_proceed(now, &BASE, 10.0));
        assert_eq!(geocode_gate.state(), &ThrottleState::default());
    }

    #[test]
    fn geocode_gate_accepts_wider_accuracy_and_shorter_hops() {
        let mut gate = ThrottleGate::new(ThrottleConfig::geocode());
        let start = Instant::now();
        gate.record_attempt(start, BASE);

        let later = start + Duration::from_secs(5);
        assert!(gate.should_proceed(later, &north_of_base(55.0), 80.0));
        assert!(!gate.should_proceed(later, &north_of_base(55.0), 100.0));
    }
}
