use crate::enrichment::speed_limit::{DEFAULT_FALLBACK_LIMIT_KMH, overpass};
use crate::enrichment::{ThrottleConfig, nominatim};
use crate::pipeline::PipelineConfig;
use crate::settings::Settings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_USER_AGENT: &str = concat!("roadspeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub location: Option<LocationSection>,
    #[serde(default)]
    pub speed_limit: Option<SpeedLimitSection>,
    #[serde(default)]
    pub geocoder: Option<GeocoderSection>,
    #[serde(default)]
    pub trip: Option<TripSection>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationSection {
    /// JSON-lines file of recorded fixes to replay
    pub replay_path: Option<PathBuf>,
    /// Replay speed multiplier (default: 1.0)
    pub playback_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeedLimitSection {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub fallback_limit_kmh: Option<f64>,
    pub min_interval_secs: Option<u64>,
    pub min_distance_m: Option<f64>,
    pub accuracy_ceiling_m: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderSection {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub min_interval_secs: Option<u64>,
    pub min_distance_m: Option<f64>,
    pub accuracy_ceiling_m: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TripSection {
    /// Start a trip as soon as the pipeline runs (default: true)
    pub auto_start: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn replay_path(&self) -> Option<&Path> {
        let path = self.location.as_ref()?.replay_path.as_deref()?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }

    pub fn playback_rate(&self) -> f64 {
        self.location
            .as_ref()
            .and_then(|l| l.playback_rate)
            .unwrap_or(1.0)
    }

    pub fn speed_limit_endpoint(&self) -> String {
        self.speed_limit
            .as_ref()
            .and_then(|s| s.endpoint.clone())
            .unwrap_or_else(|| overpass::DEFAULT_ENDPOINT.to_string())
    }

    pub fn speed_limit_timeout(&self) -> Duration {
        let ms = self
            .speed_limit
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn geocoder_endpoint(&self) -> String {
        self.geocoder
            .as_ref()
            .and_then(|g| g.endpoint.clone())
            .unwrap_or_else(|| nominatim::DEFAULT_ENDPOINT.to_string())
    }

    pub fn geocoder_timeout(&self) -> Duration {
        let ms = self
            .geocoder
            .as_ref()
            .and_then(|g| g.timeout_ms)
            .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn trip_auto_start(&self) -> bool {
        self.trip.as_ref().and_then(|t| t.auto_start).unwrap_or(true)
    }

    /// Pipeline parameters, with built-in throttle limits for anything not overridden.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut speed_limit_throttle = ThrottleConfig::speed_limit();
        let mut fallback_limit_kmh = DEFAULT_FALLBACK_LIMIT_KMH;
        if let Some(section) = &self.speed_limit {
            apply_throttle_overrides(
                &mut speed_limit_throttle,
                section.min_interval_secs,
                section.min_distance_m,
                section.accuracy_ceiling_m,
            );
            if let Some(limit) = section.fallback_limit_kmh.filter(|limit| *limit > 0.0) {
                fallback_limit_kmh = limit;
            }
        }

        let mut geocode_throttle = ThrottleConfig::geocode();
        if let Some(section) = &self.geocoder {
            apply_throttle_overrides(
                &mut geocode_throttle,
                section.min_interval_secs,
                section.min_distance_m,
                section.accuracy_ceiling_m,
            );
        }

        PipelineConfig {
            speed_limit_throttle,
            geocode_throttle,
            lookup_timeout: self.speed_limit_timeout(),
            fallback_limit_kmh,
        }
    }
}

fn apply_throttle_overrides(
    throttle: &mut ThrottleConfig,
    min_interval_secs: Option<u64>,
    min_distance_m: Option<f64>,
    accuracy_ceiling_m: Option<f64>,
) {
    if let Some(secs) = min_interval_secs {
        throttle.min_interval = Duration::from_secs(secs);
    }
    if let Some(metres) = min_distance_m {
        throttle.min_distance_m = metres;
    }
    if let Some(metres) = accuracy_ceiling_m {
        throttle.accuracy_ceiling_m = metres;
    }
}
