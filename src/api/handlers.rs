use crate::api::ApiState;
use crate::api::responses::{
    ApiErrorCode, ApiErrorResponse, CommandAcceptedResponse, HealthStatus, HealthSuccessResponse,
    LocationSuccessResponse, SettingsSuccessResponse, SpeedLimitBody, SpeedSuccessResponse,
    TripSuccessResponse,
};
use crate::enrichment::{SpeedLimitRecord, SpeedLimitSource};
use crate::pipeline::PipelineCommand;
use crate::settings::{Settings, SettingsUpdate};
use crate::signal::QualityTier;
use crate::state::PipelineSnapshot;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error {
        status: StatusCode,
        body: ApiErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_speed(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    build_speed_response(&snapshot)
}

pub async fn get_trip(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    build_trip_response(&snapshot, SystemTime::now())
}

pub async fn get_location(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    build_location_response(&snapshot, SystemTime::now())
}

pub async fn get_settings(State(state): State<ApiState>) -> impl IntoResponse {
    let settings = state.snapshot.borrow().settings.clone();
    ok(
        SettingsSuccessResponse {
            settings,
            timestamp: String::new(),
        },
        SystemTime::now(),
        "/api/settings",
        |body, timestamp| body.timestamp = timestamp,
    )
}

pub async fn put_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    let now = SystemTime::now();
    let current = state.snapshot.borrow().settings.clone();
    let settings = match merge_settings(&current, &update) {
        Ok(settings) => settings,
        Err(message) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorCode::InvalidSettings,
                message,
                now,
                "/api/settings",
            );
        }
    };
    dispatch(&state, PipelineCommand::UpdateSettings(settings)).await
}

pub async fn start_trip(State(state): State<ApiState>) -> impl IntoResponse {
    dispatch(&state, PipelineCommand::StartTrip).await
}

pub async fn stop_trip(State(state): State<ApiState>) -> impl IntoResponse {
    dispatch(&state, PipelineCommand::StopTrip).await
}

pub async fn reset_trip(State(state): State<ApiState>) -> impl IntoResponse {
    dispatch(&state, PipelineCommand::ResetTrip).await
}

pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    build_health_response(&snapshot, SystemTime::now())
}

async fn dispatch(
    state: &ApiState,
    command: PipelineCommand,
) -> ApiResponse<CommandAcceptedResponse> {
    let (endpoint, label) = command_route(&command);
    let delivered = state.commands.send(command).await.is_ok();
    build_command_response(endpoint, label, delivered, SystemTime::now())
}

/// Endpoint and response label for each command the API accepts.
fn command_route(command: &PipelineCommand) -> (&'static str, &'static str) {
    match command {
        PipelineCommand::StartTrip => ("/api/trip/start", "start_trip"),
        PipelineCommand::StopTrip => ("/api/trip/stop", "stop_trip"),
        PipelineCommand::ResetTrip => ("/api/trip/reset", "reset_trip"),
        PipelineCommand::UpdateSettings(_) => ("/api/settings", "update_settings"),
    }
}

fn build_speed_response(snapshot: &PipelineSnapshot) -> ApiResponse<SpeedSuccessResponse> {
    let unit = snapshot.settings.speed_unit;
    let quality = snapshot
        .accuracy
        .map(|report| report.tier)
        .unwrap_or(QualityTier::Unavailable);
    let body = SpeedSuccessResponse {
        speed: unit.speed_from_kmh(snapshot.speed_kmh),
        unit: unit.speed_label(),
        quality,
        speed_limit: snapshot
            .speed_limit
            .as_ref()
            .map(|record| speed_limit_body(record, &snapshot.settings)),
        exceeding_limit: snapshot.exceeding_limit,
        timestamp: String::new(),
    };
    ok(body, snapshot.updated_at, "/api/speed", |body, timestamp| {
        body.timestamp = timestamp
    })
}

fn speed_limit_body(record: &SpeedLimitRecord, settings: &Settings) -> SpeedLimitBody {
    let reason = match &record.source {
        SpeedLimitSource::Estimated(reason) => Some(reason.clone()),
        SpeedLimitSource::RemoteLookup | SpeedLimitSource::ManualOverride => None,
    };
    SpeedLimitBody {
        limit: settings.speed_unit.speed_from_kmh(record.limit_kmh),
        source: record.source.as_str().to_string(),
        reason,
        confidence: record.confidence,
    }
}

fn build_trip_response(
    snapshot: &PipelineSnapshot,
    now: SystemTime,
) -> ApiResponse<TripSuccessResponse> {
    let unit = snapshot.settings.speed_unit;
    let trip = &snapshot.trip;
    let body = TripSuccessResponse {
        is_active: trip.is_active,
        duration_seconds: trip.duration.as_secs(),
        distance: unit.distance_from_km(trip.distance_km),
        distance_unit: unit.distance_label(),
        max_speed: unit.speed_from_kmh(trip.max_speed_kmh),
        average_speed: unit.speed_from_kmh(trip.average_speed_kmh),
        speed_unit: unit.speed_label(),
        sample_count: trip.sample_count,
        timestamp: String::new(),
    };
    ok(body, now, "/api/trip", |body, timestamp| body.timestamp = timestamp)
}

fn build_location_response(
    snapshot: &PipelineSnapshot,
    now: SystemTime,
) -> ApiResponse<LocationSuccessResponse> {
    let Some(info) = snapshot.location_info.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::NoData,
            "No location information available",
            now,
            "/api/location",
        );
    };
    let body = LocationSuccessResponse {
        street_name: info.street_name,
        city_name: info.city_name,
        country_code: info.country_code,
        timestamp: String::new(),
    };
    ok(body, info.timestamp, "/api/location", |body, timestamp| {
        body.timestamp = timestamp
    })
}

fn build_command_response(
    endpoint: &str,
    command: &'static str,
    delivered: bool,
    now: SystemTime,
) -> ApiResponse<CommandAcceptedResponse> {
    if !delivered {
        warn!(endpoint, command, "Pipeline command channel closed");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::PipelineUnavailable,
            "Location pipeline is not running",
            now,
            endpoint,
        );
    }
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::ACCEPTED,
            body: CommandAcceptedResponse { command, timestamp },
        },
        Err(_) => internal_error(endpoint, "timestamp formatting failure"),
    }
}

fn build_health_response(
    snapshot: &PipelineSnapshot,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let status = derive_health_status(snapshot);
    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: status_code,
            body: HealthSuccessResponse {
                status,
                authorization: snapshot.authorization,
                timestamp,
            },
        },
        Err(_) => internal_error("/api/health", "timestamp formatting failure"),
    }
}

fn derive_health_status(snapshot: &PipelineSnapshot) -> HealthStatus {
    if !snapshot.authorization.is_authorized() {
        return HealthStatus::Ko;
    }
    match snapshot.accuracy {
        Some(report) if report.tier != QualityTier::Unavailable => HealthStatus::Ok,
        _ => HealthStatus::Degraded,
    }
}

/// Overlay a partial update on the current settings and validate the result.
fn merge_settings(current: &Settings, update: &SettingsUpdate) -> Result<Settings, &'static str> {
    let merged = update.apply_to(current);
    validate_settings(&merged)?;
    Ok(merged)
}

fn validate_settings(settings: &Settings) -> Result<(), &'static str> {
    if !settings.speed_smoothing_factor.is_finite()
        || !(0.0..=1.0).contains(&settings.speed_smoothing_factor)
    {
        return Err("speed_smoothing_factor must be between 0 and 1");
    }
    Ok(())
}

/// 200 with `body`, once its timestamp has been filled in.
fn ok<T>(
    mut body: T,
    timestamp: SystemTime,
    endpoint: &str,
    set_timestamp: impl FnOnce(&mut T, String),
) -> ApiResponse<T> {
    match format_timestamp(timestamp) {
        Ok(formatted) => {
            set_timestamp(&mut body, formatted);
            ApiResponse::Success {
                status: StatusCode::OK,
                body,
            }
        }
        Err(_) => internal_error(endpoint, "timestamp formatting failure"),
    }
}

fn error_response<T>(
    status: StatusCode,
    error_code: ApiErrorCode,
    message: &str,
    now: SystemTime,
    endpoint: &str,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ApiErrorResponse {
                error_code,
                error_message: message.to_string(),
                timestamp,
            },
        },
        Err(_) => internal_error(endpoint, "timestamp formatting failure"),
    }
}

fn internal_error<T>(endpoint: &str, message: &str) -> ApiResponse<T> {
    error!(endpoint, reason = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ApiErrorResponse {
            error_code: ApiErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
