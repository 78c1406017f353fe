use std::collections::VecDeque;

pub const SMOOTHING_WINDOW: usize = 5;
/// Weighted averages below this (km/h) are reported as stopped.
pub const STATIONARY_THRESHOLD_KMH: f64 = 0.5;

/// Recency-weighted moving average over the last few raw speeds.
///
/// The oldest sample in the window has weight 1, the newest has weight `len`.
#[derive(Debug, Clone)]
pub struct SpeedSmoother {
    window: VecDeque<f64>,
}

impl SpeedSmoother {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(SMOOTHING_WINDOW),
        }
    }

    /// Push a raw speed and return the stabilized value.
    ///
    /// Returns `None` for negative or non-finite input, leaving the window untouched.
    pub fn update(&mut self, raw_speed: f64) -> Option<f64> {
        if !raw_speed.is_finite() || raw_speed < 0.0 {
            return None;
        }

        self.window.push_back(raw_speed);
        while self.window.len() > SMOOTHING_WINDOW {
            self.window.pop_front();
        }

        Some(self.current())
    }

    /// Stabilized speed for the current window contents (0 when empty).
    pub fn current(&self) -> f64 {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (index, speed) in self.window.iter().enumerate() {
            let weight = (index + 1) as f64;
            weighted += speed * weight;
            total_weight += weight;
        }
        if total_weight == 0.0 {
            return 0.0;
        }

        let average = weighted / total_weight;
        if average < STATIONARY_THRESHOLD_KMH {
            0.0
        } else {
            average
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for SpeedSmoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_passes_through() {
        let mut smoother = SpeedSmoother::new();

        assert_eq!(smoother.update(42.0), Some(42.0));
    }

    #[test]
    fn recent_samples_weigh_more() {
        let mut smoother = SpeedSmoother::new();
        smoother.update(10.0);

        // (10*1 + 40*2) / 3 = 30
        assert_eq!(smoother.update(40.0), Some(30.0));
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut smoother = SpeedSmoother::new();
        smoother.update(1000.0);
        for _ in 0..SMOOTHING_WINDOW {
            smoother.update(20.0);
        }

        assert_eq!(smoother.len(), SMOOTHING_WINDOW);
        assert_eq!(smoother.current(), 20.0);
    }

    #[test]
    fn full_window_uses_linear_weights() {
        let mut smoother = SpeedSmoother::new();
        let mut result = None;
        for speed in [10.0, 20.0, 30.0, 40.0, 50.0] {
            result = smoother.update(speed);
        }

        // (10 + 40 + 90 + 160 + 250) / 15
        let expected = 550.0 / 15.0;
        let value = result.expect("accepted");
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn near_zero_average_reports_stopped() {
        let mut smoother = SpeedSmoother::new();
        smoother.update(0.2);

        assert_eq!(smoother.update(0.6), Some(0.0)); // (0.2 + 1.2) / 3 < 0.5
    }

    #[test]
    fn negative_speed_is_rejected_without_state_change() {
        let mut smoother = SpeedSmoother::new();
        smoother.update(12.0);

        assert_eq!(smoother.update(-1.0), None);
        assert_eq!(smoother.update(f64::NAN), None);
        assert_eq!(smoother.len(), 1);
        assert_eq!(smoother.current(), 12.0);
    }

    #[test]
    fn reset_clears_window() {
        let mut smoother = SpeedSmoother::new();
        smoother.update(80.0);
        smoother.reset();

        assert!(smoother.is_empty());
        assert_eq!(smoother.update(30.0), Some(30.0));
    }

    #[test]
    fn output_stays_within_window_bounds() {
        let speeds = [0.0, 3.0, 120.0, 0.4, 55.5, 7.0, 0.0, 0.0, 99.0, 1.0, 0.3, 64.0];
        let mut smoother = SpeedSmoother::new();
        let mut recent: VecDeque<f64> = VecDeque::new();

        for speed in speeds {
            recent.push_back(speed);
            if recent.len() > SMOOTHING_WINDOW {
                recent.pop_front();
            }
            let max = recent.iter().copied().fold(0.0, f64::max);

            let value = smoother.update(speed).expect("non-negative accepted");

            assert!((0.0..=max).contains(&value), "{value} outside [0, {max}]");
            assert!(value == 0.0 || value >= STATIONARY_THRESHOLD_KMH);
        }
    }
}
