use crate::enrichment::geocode::{GeocodeError, Geocoder, Placemark};
use crate::enrichment::speed_limit::{LookupError, MaxSpeed, SpeedLimitLookup, parse_maxspeed};
use crate::location::Coordinate;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// Raw `maxspeed` tag returned by the service.
    Tag(String),
    NoTaggedRoad,
    Status(u16),
}

#[derive(Debug)]
pub struct StaticSpeedLimitLookup {
    outcome: LookupOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSpeedLimitLookup {
    pub fn new(outcome: LookupOutcome) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeedLimitLookup for StaticSpeedLimitLookup {
    async fn lookup(&self, _coordinate: Coordinate) -> Result<MaxSpeed, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            LookupOutcome::Tag(raw) => {
                parse_maxspeed(raw).ok_or_else(|| LookupError::Unparsable(raw.clone()))
            }
            LookupOutcome::NoTaggedRoad => Err(LookupError::NoTaggedRoad),
            LookupOutcome::Status(code) => Err(LookupError::Status(*code)),
        }
    }
}

#[derive(Debug)]
pub struct StaticGeocoder {
    placemark: Option<Placemark>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticGeocoder {
    pub fn succeeding(placemark: Placemark) -> Self {
        Self {
            placemark: Some(placemark),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            placemark: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn reverse(&self, _coordinate: Coordinate) -> Result<Placemark, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.placemark
            .clone()
            .ok_or_else(|| GeocodeError::Unavailable("mock geocoder failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_counts_calls_and_reports_status() {
        let lookup = StaticSpeedLimitLookup::new(LookupOutcome::Status(429));

        let result = lookup.lookup(Coordinate::new(0.0, 0.0)).await;

        assert_eq!(lookup.calls(), 1);
        assert_eq!(result.unwrap_err().to_string(), "http status 429");
    }

    #[tokio::test]
    async fn failing_geocoder_returns_unavailable() {
        let geocoder = StaticGeocoder::failing();

        let err = geocoder.reverse(Coordinate::new(0.0, 0.0)).await.unwrap_err();

        assert_eq!(err.to_string(), "geocoder unavailable: mock geocoder failure");
    }
}
