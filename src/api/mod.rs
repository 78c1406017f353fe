use crate::pipeline::PipelineCommand;
use crate::state::PipelineSnapshot;
use axum::Router;
use axum::routing::{get, post};
use tokio::sync::{mpsc, watch};

pub mod handlers;
pub mod responses;

/// Read side of the pipeline plus the command inbox; handlers never touch
/// pipeline internals directly.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub snapshot: watch::Receiver<PipelineSnapshot>,
    pub commands: mpsc::Sender<PipelineCommand>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/speed", get(handlers::get_speed))
        .route("/api/trip", get(handlers::get_trip))
        .route("/api/trip/start", post(handlers::start_trip))
        .route("/api/trip/stop", post(handlers::stop_trip))
        .route("/api/trip/reset", post(handlers::reset_trip))
        .route("/api/location", get(handlers::get_location))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route("/api/health", get(handlers::get_health))
        .with_state(state)
}
