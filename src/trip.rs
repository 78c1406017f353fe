//! Driving-trip statistics: duration, distance, max and average speed.
//!
//! Speeds are km/h and distances km. The aggregator owns the activity state
//! and the bounded sample history; deciding which samples are worth adding
//! (minimum speed) is left to the caller.

use std::time::{Duration, Instant};

pub const MAX_SAMPLE_HISTORY: usize = 1000;
pub const SAMPLE_TRIM_BATCH: usize = 100;
/// Speeds at or below this are GPS jitter and never reach the trip.
pub const MIN_TRIP_SPEED_KMH: f64 = 1.0;
/// Per-fix distance deltas outside this open band are jitter or teleports.
pub const MIN_DISTANCE_DELTA_KM: f64 = 0.001;
pub const MAX_DISTANCE_DELTA_KM: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripSummary {
    pub is_active: bool,
    pub duration: Duration,
    pub distance_km: f64,
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TripAggregator {
    started_at: Option<Instant>,
    duration: Duration,
    distance_km: f64,
    max_speed_kmh: f64,
    samples: Vec<f64>,
}

impl TripAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin a fresh trip. No-op while a trip is already running.
    pub fn start(&mut self, now: Instant) {
        if self.is_active() {
            return;
        }
        self.clear_counters();
        self.started_at = Some(now);
    }

    /// End the trip, keeping its counters for the summary.
    pub fn stop(&mut self, now: Instant) {
        if self.is_active() {
            self.tick(now);
        }
        self.started_at = None;
    }

    /// Zero every counter without changing whether a trip is running. A
    /// running trip restarts its clock at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.clear_counters();
        if self.is_active() {
            self.started_at = Some(now);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(started_at) = self.started_at {
            self.duration = now.saturating_duration_since(started_at);
        }
    }

    pub fn add_speed_sample(&mut self, speed_kmh: f64) {
        if !self.is_active() || !speed_kmh.is_finite() {
            return;
        }
        self.max_speed_kmh = self.max_speed_kmh.max(speed_kmh);
        self.samples.push(speed_kmh);
        if self.samples.len() > MAX_SAMPLE_HISTORY {
            self.samples.drain(..SAMPLE_TRIM_BATCH);
        }
    }

    /// Accumulate a distance delta; returns whether it was accepted.
    pub fn add_distance(&mut self, delta_km: f64) -> bool {
        if !self.is_active() || !distance_delta_in_band(delta_km) {
            return false;
        }
        self.distance_km += delta_km;
        true
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    /// Mean of the retained samples. Once the history has been trimmed this
    /// covers only the most recent part of the trip.
    pub fn average_speed_kmh(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn summary(&self) -> TripSummary {
        TripSummary {
            is_active: self.is_active(),
            duration: self.duration,
            distance_km: self.distance_km,
            max_speed_kmh: self.max_speed_kmh,
            average_speed_kmh: self.average_speed_kmh(),
            sample_count: self.samples.len(),
        }
    }

    fn clear_counters(&mut self) {
        self.duration = Duration::ZERO;
        self.distance_km = 0.0;
        self.max_speed_kmh = 0.0;
        self.samples.clear();
    }
}

pub fn distance_delta_in_band(delta_km: f64) -> bool {
    delta_km > MIN_DISTANCE_DELTA_KM && delta_km < MAX_DISTANCE_DELTA_KM
}
