//! User-facing settings consumed by the pipeline and the unit conversions
//! applied at the presentation boundary.

use serde::{Deserialize, Serialize};

pub const KMH_PER_MPS: f64 = 3.6;
pub const KM_PER_MILE: f64 = 1.609_344;

/// Smoothing factor changes smaller than this do not reset the smoother.
const SMOOTHING_FACTOR_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    #[default]
    Metric,
    Imperial,
}

impl SpeedUnit {
    pub fn speed_label(self) -> &'static str {
        match self {
            Self::Metric => "km/h",
            Self::Imperial => "mph",
        }
    }

    pub fn distance_label(self) -> &'static str {
        match self {
            Self::Metric => "km",
            Self::Imperial => "mi",
        }
    }

    /// Convert a canonical km/h value into this unit.
    pub fn speed_from_kmh(self, kmh: f64) -> f64 {
        match self {
            Self::Metric => kmh,
            Self::Imperial => kmh / KM_PER_MILE,
        }
    }

    /// Convert a value expressed in this unit into km/h.
    pub fn speed_to_kmh(self, value: f64) -> f64 {
        match self {
            Self::Metric => value,
            Self::Imperial => value * KM_PER_MILE,
        }
    }

    pub fn distance_from_km(self, km: f64) -> f64 {
        match self {
            Self::Metric => km,
            Self::Imperial => km / KM_PER_MILE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub speed_unit: SpeedUnit,
    /// User-set limit in `speed_unit`; 0 means unset.
    pub manual_speed_limit: u32,
    pub speed_smoothing_factor: f64,
    pub speed_limit_alerts_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed_unit: SpeedUnit::Metric,
            manual_speed_limit: 0,
            speed_smoothing_factor: 0.5,
            speed_limit_alerts_enabled: true,
        }
    }
}

impl Settings {
    pub fn manual_limit_kmh(&self) -> Option<f64> {
        if self.manual_speed_limit == 0 {
            None
        } else {
            Some(self.speed_unit.speed_to_kmh(self.manual_speed_limit as f64))
        }
    }

    pub fn smoothing_changed(&self, other: &Settings) -> bool {
        (self.speed_smoothing_factor - other.speed_smoothing_factor).abs()
            > SMOOTHING_FACTOR_EPSILON
    }
}

/// A settings change where omitted fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub speed_unit: Option<SpeedUnit>,
    pub manual_speed_limit: Option<u32>,
    pub speed_smoothing_factor: Option<f64>,
    pub speed_limit_alerts_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply_to(&self, current: &Settings) -> Settings {
        Settings {
            speed_unit: self.speed_unit.unwrap_or(current.speed_unit),
            manual_speed_limit: self.manual_speed_limit.unwrap_or(current.manual_speed_limit),
            speed_smoothing_factor: self
                .speed_smoothing_factor
                .unwrap_or(current.speed_smoothing_factor),
            speed_limit_alerts_enabled: self
                .speed_limit_alerts_enabled
                .unwrap_or(current.speed_limit_alerts_enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_limit_zero_is_unset() {
        let settings = Settings::default();

        assert_eq!(settings.manual_limit_kmh(), None);
    }

    #[test]
    fn manual_limit_is_converted_from_display_unit() {
        let metric = Settings {
            manual_speed_limit: 80,
            ..Settings::default()
        };
        let imperial = Settings {
            speed_unit: SpeedUnit::Imperial,
            manual_speed_limit: 50,
            ..Settings::default()
        };

        assert_eq!(metric.manual_limit_kmh(), Some(80.0));
        let kmh = imperial.manual_limit_kmh().expect("limit set");
        assert!((kmh - 80.4672).abs() < 1e-9);
    }

    #[test]
    fn imperial_conversions_round_trip_through_kmh() {
        let unit = SpeedUnit::Imperial;

        assert!((unit.speed_from_kmh(unit.speed_to_kmh(65.0)) - 65.0).abs() < 1e-9);
        assert!((unit.distance_from_km(KM_PER_MILE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_smoothing_changes_are_ignored() {
        let base = Settings::default();
        let nudged = Settings {
            speed_smoothing_factor: base.speed_smoothing_factor + 1e-9,
            ..base.clone()
        };
        let changed = Settings {
            speed_smoothing_factor: 0.8,
            ..base.clone()
        };

        assert!(!base.smoothing_changed(&nudged));
        assert!(base.smoothing_changed(&changed));
    }

    #[test]
    fn partial_toml_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let settings: Settings = toml::from_str("speed_unit = \"imperial\"")?;

        assert_eq!(settings.speed_unit, SpeedUnit::Imperial);
        assert_eq!(settings.manual_speed_limit, 0);
        assert!(settings.speed_limit_alerts_enabled);
        Ok(())
    }

    #[test]
    fn partial_update_keeps_omitted_fields() -> Result<(), Box<dyn std::error::Error>> {
        let current = Settings {
            speed_unit: SpeedUnit::Imperial,
            manual_speed_limit: 65,
            speed_smoothing_factor: 0.7,
            speed_limit_alerts_enabled: false,
        };
        let update: SettingsUpdate = serde_json::from_str(r#"{"manual_speed_limit": 50}"#)?;

        let merged = update.apply_to(&current);

        assert_eq!(
            merged,
            Settings {
                manual_speed_limit: 50,
                ..current
            }
        );
        Ok(())
    }

    #[test]
    fn empty_update_changes_nothing() {
        let current = Settings {
            manual_speed_limit: 80,
            ..Settings::default()
        };

        assert_eq!(SettingsUpdate::default().apply_to(&current), current);
    }
}
