use serde::Serialize;

pub const EXCELLENT_MAX_M: f64 = 5.0;
pub const GOOD_MAX_M: f64 = 15.0;
pub const FAIR_MAX_M: f64 = 50.0;
pub const POOR_MAX_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Unavailable,
}

impl QualityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyReport {
    pub horizontal_accuracy_m: f64,
    pub speed_accuracy: f64,
    pub tier: QualityTier,
}

impl AccuracyReport {
    pub fn new(horizontal_accuracy_m: f64, speed_accuracy: f64) -> Self {
        Self {
            horizontal_accuracy_m,
            speed_accuracy,
            tier: classify(horizontal_accuracy_m),
        }
    }
}

/// Map a horizontal accuracy radius to a tier. Boundaries belong to the
/// better tier. Negative or non-finite radii mean the platform had no fix.
pub fn classify(horizontal_accuracy_m: f64) -> QualityTier {
    if !horizontal_accuracy_m.is_finite() || horizontal_accuracy_m < 0.0 {
        return QualityTier::Unavailable;
    }
    if horizontal_accuracy_m <= EXCELLENT_MAX_M {
        QualityTier::Excellent
    } else if horizontal_accuracy_m <= GOOD_MAX_M {
        QualityTier::Good
    } else if horizontal_accuracy_m <= FAIR_MAX_M {
        QualityTier::Fair
    } else if horizontal_accuracy_m <= POOR_MAX_M {
        QualityTier::Poor
    } else {
        QualityTier::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_classify_into_better_tier() {
        assert_eq!(classify(5.0), QualityTier::Excellent);
        assert_eq!(classify(15.0), QualityTier::Good);
        assert_eq!(classify(50.0), QualityTier::Fair);
        assert_eq!(classify(100.0), QualityTier::Poor);
    }

    #[test]
    fn just_past_boundary_drops_a_tier() {
        assert_eq!(classify(5.0001), QualityTier::Good);
        assert_eq!(classify(15.01), QualityTier::Fair);
        assert_eq!(classify(50.5), QualityTier::Poor);
        assert_eq!(classify(100.1), QualityTier::Unavailable);
    }

    #[test]
    fn wide_or_invalid_radius_is_unavailable() {
        assert_eq!(classify(150.0), QualityTier::Unavailable);
        assert_eq!(classify(-1.0), QualityTier::Unavailable);
        assert_eq!(classify(f64::NAN), QualityTier::Unavailable);
        assert_eq!(classify(f64::INFINITY), QualityTier::Unavailable);
    }

    #[test]
    fn report_carries_inputs_and_tier() {
        let report = AccuracyReport::new(12.0, 0.8);

        assert_eq!(report.horizontal_accuracy_m, 12.0);
        assert_eq!(report.speed_accuracy, 0.8);
        assert_eq!(report.tier, QualityTier::Good);
    }
}
