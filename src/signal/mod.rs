//! Per-fix signal processing: speed stabilization and accuracy tiers.

pub mod accuracy;
pub mod smoother;

pub use accuracy::{AccuracyReport, QualityTier, classify};
pub use smoother::SpeedSmoother;
