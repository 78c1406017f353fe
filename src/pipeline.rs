//! Per-fix orchestration of the location signal chain.
//!
//! One `LocationPipeline` owns every component and is driven from a single
//! task: fixes, enrichment results and commands are all applied there, so
//! none of the component state needs a lock. Enrichment lookups run on
//! spawned tasks and hand their results back through a channel; a newer
//! request of the same kind makes older results stale.

use crate::enrichment::geocode::{GeocodeError, Geocoder, LocationInfo, ReverseGeocodeLookup};
use crate::enrichment::sequence::RequestToken;
use crate::enrichment::speed_limit::{
    DEFAULT_FALLBACK_LIMIT_KMH, DEFAULT_LOOKUP_TIMEOUT, SpeedLimitLookup, SpeedLimitRecord,
    SpeedLimitResolver,
};
use crate::enrichment::throttle::ThrottleConfig;
use crate::location::{AuthorizationStatus, Coordinate, LocationFix, LocationProvider};
use crate::settings::{KMH_PER_MPS, Settings};
use crate::signal::{AccuracyReport, QualityTier, SpeedSmoother};
use crate::state::{PipelineSnapshot, PipelineState, SpeedAlert};
use crate::trip::{MIN_TRIP_SPEED_KMH, TripAggregator, TripSummary};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub speed_limit_throttle: ThrottleConfig,
    pub geocode_throttle: ThrottleConfig,
    pub lookup_timeout: Duration,
    pub fallback_limit_kmh: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            speed_limit_throttle: ThrottleConfig::speed_limit(),
            geocode_throttle: ThrottleConfig::geocode(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            fallback_limit_kmh: DEFAULT_FALLBACK_LIMIT_KMH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    StartTrip,
    StopTrip,
    ResetTrip,
    UpdateSettings(Settings),
}

/// A finished enrichment lookup on its way back to the pipeline task.
#[derive(Debug)]
pub enum Enrichment {
    SpeedLimit {
        token: RequestToken,
        record: SpeedLimitRecord,
    },
    Geocode {
        token: RequestToken,
        result: Result<LocationInfo, GeocodeError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidCoordinate,
    InvalidSpeed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFix {
    pub speed_kmh: f64,
    pub tier: QualityTier,
    pub trip_sample_added: bool,
    pub distance_added_km: Option<f64>,
    pub speed_limit_requested: bool,
    pub geocode_requested: bool,
    pub alert: Option<SpeedAlert>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Rejected(RejectReason),
    Processed(ProcessedFix),
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    StreamEnded,
    Unauthorized(AuthorizationStatus),
}

/// Edge detector for "speed above limit": reports only false→true changes.
#[derive(Debug, Clone, Default)]
pub struct ExceedanceTrigger {
    exceeding: bool,
}

impl ExceedanceTrigger {
    pub fn update(&mut self, exceeding: bool) -> bool {
        let fired = exceeding && !self.exceeding;
        self.exceeding = exceeding;
        fired
    }

    pub fn is_exceeding(&self) -> bool {
        self.exceeding
    }
}

pub struct LocationPipeline {
    settings: Settings,
    authorization: AuthorizationStatus,
    smoother: SpeedSmoother,
    speed_limit: SpeedLimitResolver,
    geocode: ReverseGeocodeLookup,
    trip: TripAggregator,
    trigger: ExceedanceTrigger,
    accuracy: Option<AccuracyReport>,
    speed_kmh: f64,
    last_coordinate: Option<Coordinate>,
    speed_limit_lookup: Arc<dyn SpeedLimitLookup>,
    geocoder: Arc<dyn Geocoder>,
    speed_limit_task: Option<JoinHandle<()>>,
    geocode_task: Option<JoinHandle<()>>,
    enrichment_tx: mpsc::UnboundedSender<Enrichment>,
    enrichment_rx: mpsc::UnboundedReceiver<Enrichment>,
    state: PipelineState,
}

impl LocationPipeline {
    pub fn new(
        config: PipelineConfig,
        settings: Settings,
        speed_limit_lookup: Arc<dyn SpeedLimitLookup>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let mut speed_limit = SpeedLimitResolver::new(
            config.speed_limit_throttle,
            config.lookup_timeout,
            config.fallback_limit_kmh,
        );
        speed_limit.set_manual_override(settings.manual_limit_kmh());
        let (enrichment_tx, enrichment_rx) = mpsc::unbounded_channel();
        let state = PipelineState::new(PipelineSnapshot::initial(settings.clone()));

        Self {
            settings,
            authorization: AuthorizationStatus::NotDetermined,
            smoother: SpeedSmoother::new(),
            speed_limit,
            geocode: ReverseGeocodeLookup::new(config.geocode_throttle),
            trip: TripAggregator::new(),
            trigger: ExceedanceTrigger::default(),
            accuracy: None,
            speed_kmh: 0.0,
            last_coordinate: None,
            speed_limit_lookup,
            geocoder,
            speed_limit_task: None,
            geocode_task: None,
            enrichment_tx,
            enrichment_rx,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.state.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<SpeedAlert> {
        self.state.subscribe_alerts()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.snapshot()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn trip(&self) -> TripSummary {
        self.trip.summary()
    }

    pub fn set_authorization(&mut self, authorization: AuthorizationStatus) {
        if self.authorization != authorization {
            info!(?authorization, "Location authorization changed");
        }
        self.authorization = authorization;
        self.publish();
    }

    /// Run one fix through the chain. Must be called from within a tokio
    /// runtime, since enrichment lookups are spawned from here.
    pub fn handle_fix(&mut self, fix: &LocationFix, now: Instant) -> FixOutcome {
        let coordinate = fix.coordinate();
        if !coordinate.is_valid() {
            debug!(
                latitude = fix.latitude,
                longitude = fix.longitude,
                "Dropping fix with invalid coordinate"
            );
            return FixOutcome::Rejected(RejectReason::InvalidCoordinate);
        }

        let accuracy = AccuracyReport::new(fix.horizontal_accuracy_m, fix.speed_accuracy);
        let Some(speed_kmh) = self.smoother.update(fix.raw_speed_mps * KMH_PER_MPS) else {
            debug!(raw_speed_mps = fix.raw_speed_mps, "Dropping fix with invalid speed");
            return FixOutcome::Rejected(RejectReason::InvalidSpeed);
        };
        self.accuracy = Some(accuracy);
        self.speed_kmh = speed_kmh;

        self.trip.tick(now);
        let mut trip_sample_added = false;
        let mut distance_added_km = None;
        if self.trip.is_active() && speed_kmh > MIN_TRIP_SPEED_KMH {
            self.trip.add_speed_sample(speed_kmh);
            trip_sample_added = true;
            if let Some(previous) = self.last_coordinate {
                let delta_km = previous.distance_to(&coordinate) / 1000.0;
                if self.trip.add_distance(delta_km) {
                    distance_added_km = Some(delta_km);
                }
            }
        }
        self.last_coordinate = Some(coordinate);

        let speed_limit_requested = self.request_speed_limit(fix, now);
        let geocode_requested = self.request_geocode(fix, now);
        let alert = self.evaluate_limit();

        self.publish();

        FixOutcome::Processed(ProcessedFix {
            speed_kmh,
            tier: accuracy.tier,
            trip_sample_added,
            distance_added_km,
            speed_limit_requested,
            geocode_requested,
            alert,
        })
    }

    /// Apply a finished lookup. Returns whether it changed the pipeline state.
    pub fn apply_enrichment(&mut self, enrichment: Enrichment) -> bool {
        let applied = match enrichment {
            Enrichment::SpeedLimit { token, record } => {
                let applied = self.speed_limit.apply(token, record);
                if applied {
                    self.evaluate_limit();
                }
                applied
            }
            Enrichment::Geocode { token, result } => self.geocode.apply(token, result),
        };
        if applied {
            self.publish();
        }
        applied
    }

    /// Wait for the next enrichment result without applying it.
    pub async fn next_enrichment(&mut self) -> Option<Enrichment> {
        self.enrichment_rx.recv().await
    }

    pub fn handle_command(&mut self, command: PipelineCommand, now: Instant) {
        match command {
            PipelineCommand::StartTrip => {
                if self.trip.is_active() {
                    debug!("Trip already active");
                } else {
                    info!("Trip started");
                    // distance only counts from the first fix inside the trip
                    self.last_coordinate = None;
                }
                self.trip.start(now);
            }
            PipelineCommand::StopTrip => {
                self.trip.stop(now);
                let summary = self.trip.summary();
                info!(
                    duration_secs = summary.duration.as_secs(),
                    distance_km = summary.distance_km,
                    max_speed_kmh = summary.max_speed_kmh,
                    "Trip stopped"
                );
            }
            PipelineCommand::ResetTrip => {
                self.trip.reset(now);
                self.last_coordinate = None;
                info!("Trip counters reset");
            }
            PipelineCommand::UpdateSettings(settings) => self.apply_settings(settings),
        }
        self.publish();
    }

    /// Drive the pipeline from a provider until its stream ends. Commands
    /// and enrichment results are interleaved with fixes on this task.
    /// Lookups still in flight when the stream ends are awaited and applied
    /// before returning. The command inbox stays usable afterwards, see
    /// [`LocationPipeline::serve_commands`].
    pub async fn run<P>(
        &mut self,
        provider: &mut P,
        commands: &mut mpsc::Receiver<PipelineCommand>,
    ) -> RunOutcome
    where
        P: LocationProvider + ?Sized,
    {
        let authorization = provider.authorization();
        self.set_authorization(authorization);
        if !authorization.is_authorized() {
            warn!(?authorization, "Location not authorized, pipeline idle");
            return RunOutcome::Unauthorized(authorization);
        }

        let mut commands_open = true;
        loop {
            tokio::select! {
                fix = provider.next_fix() => match fix {
                    Some(fix) => {
                        self.handle_fix(&fix, Instant::now());
                    }
                    None => {
                        info!("Location stream ended");
                        self.finish_enrichment().await;
                        return RunOutcome::StreamEnded;
                    }
                },
                Some(enrichment) = self.enrichment_rx.recv() => {
                    self.apply_enrichment(enrichment);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command, Instant::now()),
                    None => {
                        debug!("Command channel closed");
                        commands_open = false;
                    }
                },
            }
        }
    }

    /// Keep handling commands once there are no more fixes, until every
    /// sender is gone.
    pub async fn serve_commands(&mut self, commands: &mut mpsc::Receiver<PipelineCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle_command(command, Instant::now());
        }
        debug!("Command channel closed");
    }

    async fn finish_enrichment(&mut self) {
        let pending = [self.speed_limit_task.take(), self.geocode_task.take()];
        for task in pending.into_iter().flatten() {
            // aborted or panicked lookups have nothing to deliver
            let _ = task.await;
        }
        while let Ok(enrichment) = self.enrichment_rx.try_recv() {
            self.apply_enrichment(enrichment);
        }
    }

    fn apply_settings(&mut self, settings: Settings) {
        if self.settings.smoothing_changed(&settings) {
            debug!(
                factor = settings.speed_smoothing_factor,
                "Smoothing factor changed, clearing window"
            );
            self.smoother.reset();
        }
        let override_changed =
            self.speed_limit.manual_override_kmh() != settings.manual_limit_kmh();
        self.speed_limit
            .set_manual_override(settings.manual_limit_kmh());
        self.settings = settings;
        if override_changed {
            self.evaluate_limit();
        }
    }

    fn request_speed_limit(&mut self, fix: &LocationFix, now: Instant) -> bool {
        let Some(request) = self.speed_limit.begin(fix, now) else {
            return false;
        };
        if let Some(previous) = self.speed_limit_task.take() {
            previous.abort();
        }

        let source = Arc::clone(&self.speed_limit_lookup);
        let tx = self.enrichment_tx.clone();
        self.speed_limit_task = Some(tokio::spawn(async move {
            let record = request.execute(source.as_ref()).await;
            let _ = tx.send(Enrichment::SpeedLimit {
                token: request.token,
                record,
            });
        }));
        true
    }

    fn request_geocode(&mut self, fix: &LocationFix, now: Instant) -> bool {
        let Some(request) = self.geocode.begin(fix, now) else {
            return false;
        };
        if let Some(previous) = self.geocode_task.take() {
            previous.abort();
        }

        let geocoder = Arc::clone(&self.geocoder);
        let tx = self.enrichment_tx.clone();
        self.geocode_task = Some(tokio::spawn(async move {
            let result = request.execute(geocoder.as_ref()).await;
            let _ = tx.send(Enrichment::Geocode {
                token: request.token,
                result,
            });
        }));
        true
    }

    fn evaluate_limit(&mut self) -> Option<SpeedAlert> {
        let limit_kmh = self.speed_limit.effective_limit_kmh();
        let exceeding = limit_kmh.is_some_and(|limit| self.speed_kmh > limit);
        if !self.trigger.update(exceeding) || !self.settings.speed_limit_alerts_enabled {
            return None;
        }

        let alert = SpeedAlert {
            speed_kmh: self.speed_kmh,
            limit_kmh: limit_kmh?,
            at: SystemTime::now(),
        };
        info!(
            speed_kmh = alert.speed_kmh,
            limit_kmh = alert.limit_kmh,
            "Speed limit exceeded"
        );
        self.state.alert(alert.clone());
        Some(alert)
    }

    fn publish(&self) {
        self.state.publish(PipelineSnapshot {
            authorization: self.authorization,
            coordinate: self.last_coordinate,
            speed_kmh: self.speed_kmh,
            accuracy: self.accuracy,
            speed_limit: self.speed_limit.effective(),
            exceeding_limit: self.trigger.is_exceeding(),
            location_info: self.geocode.current().cloned(),
            trip: self.trip.summary(),
            settings: self.settings.clone(),
            updated_at: SystemTime::now(),
        });
    }
}
