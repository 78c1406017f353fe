use crate::location::AuthorizationStatus;
use crate::settings::Settings;
use crate::signal::QualityTier;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SpeedSuccessResponse {
    pub speed: f64,
    pub unit: &'static str,
    pub quality: QualityTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_limit: Option<SpeedLimitBody>,
    pub exceeding_limit: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SpeedLimitBody {
    pub limit: f64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TripSuccessResponse {
    pub is_active: bool,
    pub duration_seconds: u64,
    pub distance: f64,
    pub distance_unit: &'static str,
    pub max_speed: f64,
    pub average_speed: f64,
    pub speed_unit: &'static str,
    pub sample_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationSuccessResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsSuccessResponse {
    #[serde(flatten)]
    pub settings: Settings,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandAcceptedResponse {
    pub command: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub authorization: AuthorizationStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiErrorResponse {
    pub error_code: ApiErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    NoData,
    PipelineUnavailable,
    InvalidSettings,
    InternalError,
}
