//! Speed-limit resolution: remote lookup behind a throttle gate, a fixed
//! estimate when the lookup fails, and a manual override that always wins.

use crate::enrichment::sequence::{RequestSequence, RequestToken};
use crate::enrichment::throttle::{ThrottleConfig, ThrottleGate};
use crate::location::{Coordinate, LocationFix};
use crate::settings::SpeedUnit;
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, warn};

pub mod overpass;

pub const REMOTE_CONFIDENCE: f64 = 0.9;
pub const ESTIMATE_CONFIDENCE: f64 = 0.3;
pub const MANUAL_CONFIDENCE: f64 = 1.0;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FALLBACK_LIMIT_KMH: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeedLimitSource {
    RemoteLookup,
    ManualOverride,
    Estimated(String),
}

impl SpeedLimitSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RemoteLookup => "remote_lookup",
            Self::ManualOverride => "manual_override",
            Self::Estimated(_) => "estimated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedLimitRecord {
    pub limit_kmh: f64,
    pub source: SpeedLimitSource,
    /// Informational only; never used to pick between sources.
    pub confidence: f64,
    pub detected_at: SystemTime,
}

impl SpeedLimitRecord {
    pub fn remote(limit_kmh: f64, detected_at: SystemTime) -> Self {
        Self {
            limit_kmh,
            source: SpeedLimitSource::RemoteLookup,
            confidence: REMOTE_CONFIDENCE,
            detected_at,
        }
    }

    pub fn estimated(limit_kmh: f64, reason: &str, detected_at: SystemTime) -> Self {
        Self {
            limit_kmh,
            source: SpeedLimitSource::Estimated(reason.to_string()),
            confidence: ESTIMATE_CONFIDENCE,
            detected_at,
        }
    }
}

/// A `maxspeed` tag value with the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxSpeed {
    pub value: u32,
    pub unit: SpeedUnit,
}

impl MaxSpeed {
    pub fn to_kmh(self) -> f64 {
        self.unit.speed_to_kmh(self.value as f64)
    }
}

/// Parse a map-data `maxspeed` tag: `"50"`, `"50 mph"`, `"50km/h"`, `"50kmh"`.
/// Symbolic values such as `"national"` or `"none"` yield `None`.
pub fn parse_maxspeed(raw: &str) -> Option<MaxSpeed> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    let (digits, unit) = if let Some(rest) = compact.strip_suffix("mph") {
        (rest, SpeedUnit::Imperial)
    } else if let Some(rest) = compact.strip_suffix("km/h") {
        (rest, SpeedUnit::Metric)
    } else if let Some(rest) = compact.strip_suffix("kmh") {
        (rest, SpeedUnit::Metric)
    } else {
        (compact.as_str(), SpeedUnit::Metric)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value = digits.parse::<u32>().ok().filter(|value| *value > 0)?;
    Some(MaxSpeed { value, unit })
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
    #[error("no tagged road segment near the coordinate")]
    NoTaggedRoad,
    #[error("unparsable maxspeed tag: {0:?}")]
    Unparsable(String),
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Remote map-data service that knows tagged speed limits.
#[async_trait]
pub trait SpeedLimitLookup: Send + Sync + fmt::Debug {
    async fn lookup(&self, coordinate: Coordinate) -> Result<MaxSpeed, LookupError>;
}

/// A lookup that passed the gate and still has to run.
#[derive(Debug, Clone)]
pub struct SpeedLimitRequest {
    pub token: RequestToken,
    pub coordinate: Coordinate,
    timeout: Duration,
    fallback_limit_kmh: f64,
}

impl SpeedLimitRequest {
    /// Run the lookup. Never fails: errors and timeouts degrade to the estimate.
    pub async fn execute(&self, source: &dyn SpeedLimitLookup) -> SpeedLimitRecord {
        let outcome = match tokio::time::timeout(self.timeout, source.lookup(self.coordinate)).await
        {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(max_speed) => {
                debug!(
                    token = self.token.value(),
                    value = max_speed.value,
                    unit = max_speed.unit.speed_label(),
                    "Speed limit resolved remotely"
                );
                SpeedLimitRecord::remote(max_speed.to_kmh(), SystemTime::now())
            }
            Err(err) => {
                warn!(
                    token = self.token.value(),
                    error = %err,
                    "Speed limit lookup failed, using estimate"
                );
                SpeedLimitRecord::estimated(self.fallback_limit_kmh, "default", SystemTime::now())
            }
        }
    }
}

#[derive(Debug)]
pub struct SpeedLimitResolver {
    gate: ThrottleGate,
    sequence: RequestSequence,
    record: Option<SpeedLimitRecord>,
    manual_override_kmh: Option<f64>,
    timeout: Duration,
    fallback_limit_kmh: f64,
}

impl SpeedLimitResolver {
    pub fn new(throttle: ThrottleConfig, timeout: Duration, fallback_limit_kmh: f64) -> Self {
        Self {
            gate: ThrottleGate::new(throttle),
            sequence: RequestSequence::new(),
            record: None,
            manual_override_kmh: None,
            timeout,
            fallback_limit_kmh,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            ThrottleConfig::speed_limit(),
            DEFAULT_LOOKUP_TIMEOUT,
            DEFAULT_FALLBACK_LIMIT_KMH,
        )
    }

    /// Gate check for a new fix. When the gate opens the attempt is recorded
    /// and a request carrying a fresh token is returned; any earlier request
    /// becomes stale.
    pub fn begin(&mut self, fix: &LocationFix, now: Instant) -> Option<SpeedLimitRequest> {
        let coordinate = fix.coordinate();
        if !self
            .gate
            .should_proceed(now, &coordinate, fix.horizontal_accuracy_m)
        {
            return None;
        }
        self.gate.record_attempt(now, coordinate);
        Some(SpeedLimitRequest {
            token: self.sequence.issue(),
            coordinate,
            timeout: self.timeout,
            fallback_limit_kmh: self.fallback_limit_kmh,
        })
    }

    /// Store a finished lookup. Results for superseded tokens are discarded.
    pub fn apply(&mut self, token: RequestToken, record: SpeedLimitRecord) -> bool {
        if !self.sequence.is_current(token) {
            debug!(token = token.value(), "Discarding stale speed limit result");
            return false;
        }
        self.record = Some(record);
        true
    }

    /// Gate, look up and store in one step. Returns the cached record when
    /// the gate is closed.
    pub async fn resolve(
        &mut self,
        source: &dyn SpeedLimitLookup,
        fix: &LocationFix,
        now: Instant,
    ) -> Option<SpeedLimitRecord> {
        if let Some(request) = self.begin(fix, now) {
            let record = request.execute(source).await;
            self.apply(request.token, record);
        }
        self.record.clone()
    }

    pub fn set_manual_override(&mut self, limit_kmh: Option<f64>) {
        self.manual_override_kmh = limit_kmh.filter(|limit| *limit > 0.0);
    }

    pub fn manual_override_kmh(&self) -> Option<f64> {
        self.manual_override_kmh
    }

    /// Last computed (remote or estimated) record, ignoring any override.
    pub fn cached(&self) -> Option<&SpeedLimitRecord> {
        self.record.as_ref()
    }

    /// Record exposed downstream: the manual override when set, otherwise
    /// the computed record.
    pub fn effective(&self) -> Option<SpeedLimitRecord> {
        match self.manual_override_kmh {
            Some(limit_kmh) => Some(SpeedLimitRecord {
                limit_kmh,
                source: SpeedLimitSource::ManualOverride,
                confidence: MANUAL_CONFIDENCE,
                detected_at: self
                    .record
                    .as_ref()
                    .map(|record| record.detected_at)
                    .unwrap_or_else(SystemTime::now),
            }),
            None => self.record.clone(),
        }
    }

    pub fn effective_limit_kmh(&self) -> Option<f64> {
        self.manual_override_kmh
            .or_else(|| self.record.as_ref().map(|record| record.limit_kmh))
    }
}
