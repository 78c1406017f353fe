use crate::enrichment::{LocationInfo, SpeedLimitRecord};
use crate::location::{AuthorizationStatus, Coordinate};
use crate::settings::Settings;
use crate::signal::AccuracyReport;
use crate::trip::TripSummary;
use std::time::SystemTime;
use tokio::sync::{broadcast, watch};

const ALERT_CHANNEL_CAPACITY: usize = 16;

/// Everything a consumer needs to render the current state of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    pub authorization: AuthorizationStatus,
    pub coordinate: Option<Coordinate>,
    pub speed_kmh: f64,
    pub accuracy: Option<AccuracyReport>,
    /// Effective limit: the manual override when set, otherwise the lookup.
    pub speed_limit: Option<SpeedLimitRecord>,
    pub exceeding_limit: bool,
    pub location_info: Option<LocationInfo>,
    pub trip: TripSummary,
    pub settings: Settings,
    pub updated_at: SystemTime,
}

impl PipelineSnapshot {
    pub fn initial(settings: Settings) -> Self {
        Self {
            authorization: AuthorizationStatus::NotDetermined,
            coordinate: None,
            speed_kmh: 0.0,
            accuracy: None,
            speed_limit: None,
            exceeding_limit: false,
            location_info: None,
            trip: TripSummary::default(),
            settings,
            updated_at: SystemTime::now(),
        }
    }
}

/// Fired once each time the current speed goes above the effective limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedAlert {
    pub speed_kmh: f64,
    pub limit_kmh: f64,
    pub at: SystemTime,
}

/// Publishing side of the pipeline state. Snapshots coalesce (latest wins);
/// alerts are events and are delivered individually.
#[derive(Debug)]
pub struct PipelineState {
    snapshot_tx: watch::Sender<PipelineSnapshot>,
    alerts_tx: broadcast::Sender<SpeedAlert>,
}

impl PipelineState {
    pub fn new(initial: PipelineSnapshot) -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(initial);
        let (alerts_tx, _alerts_rx) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            snapshot_tx,
            alerts_tx,
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<SpeedAlert> {
        self.alerts_tx.subscribe()
    }

    /// Replace the published snapshot. Works with or without subscribers.
    pub fn publish(&self, snapshot: PipelineSnapshot) {
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Emit an alert; returns how many subscribers received it.
    pub fn alert(&self, alert: SpeedAlert) -> usize {
        self.alerts_tx.send(alert).unwrap_or(0)
    }
}
