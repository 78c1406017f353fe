use crate::enrichment::sequence::{RequestSequence, RequestToken};
use crate::enrichment::throttle::{ThrottleConfig, ThrottleGate};
use crate::location::{Coordinate, LocationFix};
use async_trait::async_trait;
use std::fmt;
use std::time::{Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

/// Address components returned by the geocoding service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placemark {
    pub thoroughfare: Option<String>,
    pub locality: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationInfo {
    pub street_name: Option<String>,
    pub city_name: Option<String>,
    pub country_code: Option<String>,
    pub timestamp: SystemTime,
}

impl LocationInfo {
    pub fn from_placemark(placemark: Placemark, timestamp: SystemTime) -> Self {
        Self {
            street_name: placemark.thoroughfare,
            city_name: placemark.locality,
            country_code: placemark.country_code,
            timestamp,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
    #[error("no address found for coordinate")]
    NotFound,
    #[error("geocoder unavailable: {0}")]
    Unavailable(String),
}

/// Reverse geocoding capability (address components by coordinate).
#[async_trait]
pub trait Geocoder: Send + Sync + fmt::Debug {
    async fn reverse(&self, coordinate: Coordinate) -> Result<Placemark, GeocodeError>;
}

#[derive(Debug, Clone)]
pub struct GeocodeRequest {
    pub token: RequestToken,
    pub coordinate: Coordinate,
}

impl GeocodeRequest {
    pub async fn execute(&self, geocoder: &dyn Geocoder) -> Result<LocationInfo, GeocodeError> {
        let placemark = geocoder.reverse(self.coordinate).await?;
        Ok(LocationInfo::from_placemark(placemark, SystemTime::now()))
    }
}

#[derive(Debug)]
pub struct ReverseGeocodeLookup {
    gate: ThrottleGate,
    sequence: RequestSequence,
    info: Option<LocationInfo>,
}

impl ReverseGeocodeLookup {
    pub fn new(throttle: ThrottleConfig) -> Self {
        Self {
            gate: ThrottleGate::new(throttle),
            sequence: RequestSequence::new(),
            info: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ThrottleConfig::geocode())
    }

    pub fn begin(&mut self, fix: &LocationFix, now: Instant) -> Option<GeocodeRequest> {
        let coordinate = fix.coordinate();
        if !self
            .gate
            .should_proceed(now, &coordinate, fix.horizontal_accuracy_m)
        {
            return None;
        }
        self.gate.record_attempt(now, coordinate);
        Some(GeocodeRequest {
            token: self.sequence.issue(),
            coordinate,
        })
    }

    /// Replace the current info on success. Failures and stale tokens leave
    /// the previous value in place.
    pub fn apply(
        &mut self,
        token: RequestToken,
        result: Result<LocationInfo, GeocodeError>,
    ) -> bool {
        if !self.sequence.is_current(token) {
            debug!(token = token.value(), "Discarding stale geocode result");
            return false;
        }
        match result {
            Ok(info) => {
                self.info = Some(info);
                true
            }
            Err(err) => {
                warn!(token = token.value(), error = %err, "Reverse geocoding failed");
                false
            }
        }
    }

    pub async fn resolve(
        &mut self,
        geocoder: &dyn Geocoder,
        fix: &LocationFix,
        now: Instant,
    ) -> Option<LocationInfo> {
        if let Some(request) = self.begin(fix, now) {
            let result = request.execute(geocoder).await;
            self.apply(request.token, result);
        }
        self.info.clone()
    }

    pub fn current(&self) -> Option<&LocationInfo> {
        self.info.as_ref()
    }
}
