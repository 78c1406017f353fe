//! JSON-lines replay of recorded drives.
//!
//! Each line holds one fix:
//!
//! ```text
//! {"latitude":45.0,"longitude":7.0,"horizontal_accuracy_m":4.0,"speed_accuracy":0.5,"speed_mps":13.9,"timestamp":"2025-06-01T08:00:00Z"}
//! ```

use crate::location::{AuthorizationStatus, LocationError, LocationFix, LocationProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tracing::{info, warn};

/// Longest pause between two replayed fixes, regardless of the recorded gap.
pub const MAX_REPLAY_GAP: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy_m: f64,
    #[serde(default)]
    speed_accuracy: f64,
    speed_mps: f64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl From<ReplayRecord> for LocationFix {
    fn from(record: ReplayRecord) -> Self {
        LocationFix {
            latitude: record.latitude,
            longitude: record.longitude,
            horizontal_accuracy_m: record.horizontal_accuracy_m,
            speed_accuracy: record.speed_accuracy,
            raw_speed_mps: record.speed_mps,
            timestamp: SystemTime::from(record.timestamp),
        }
    }
}

#[derive(Debug)]
pub struct ReplayProvider {
    fixes: VecDeque<LocationFix>,
    playback_rate: f64,
    last_timestamp: Option<SystemTime>,
    /// When the front fix is due; kept across cancelled `next_fix` calls.
    due: Option<tokio::time::Instant>,
}

impl ReplayProvider {
    pub async fn from_path(
        path: impl AsRef<Path>,
        playback_rate: f64,
    ) -> Result<Self, LocationError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let fixes = parse_replay(&contents);
        if fixes.is_empty() {
            return Err(LocationError::Empty);
        }
        info!(
            path = %path.display(),
            fixes = fixes.len(),
            playback_rate,
            "Location replay loaded"
        );
        Ok(Self::new(fixes, playback_rate))
    }

    pub fn new(fixes: Vec<LocationFix>, playback_rate: f64) -> Self {
        let playback_rate = if playback_rate.is_finite() && playback_rate > 0.0 {
            playback_rate
        } else {
            1.0
        };
        Self {
            fixes: fixes.into(),
            playback_rate,
            last_timestamp: None,
            due: None,
        }
    }

    fn delay_before(&self, fix: &LocationFix) -> Duration {
        let Some(previous) = self.last_timestamp else {
            return Duration::ZERO;
        };
        let gap = fix
            .timestamp
            .duration_since(previous)
            .unwrap_or(Duration::ZERO)
            .min(MAX_REPLAY_GAP);
        gap.div_f64(self.playback_rate)
    }
}

#[async_trait]
impl LocationProvider for ReplayProvider {
    fn authorization(&self) -> AuthorizationStatus {
        AuthorizationStatus::AuthorizedWhenInUse
    }

    /// Cancel-safe: a fix is only consumed once its due time has passed.
    async fn next_fix(&mut self) -> Option<LocationFix> {
        let due = match self.due {
            Some(due) => due,
            None => {
                let delay = self.delay_before(self.fixes.front()?);
                let due = tokio::time::Instant::now() + delay;
                self.due = Some(due);
                due
            }
        };
        tokio::time::sleep_until(due).await;

        self.due = None;
        let fix = self.fixes.pop_front()?;
        self.last_timestamp = Some(fix.timestamp);
        Some(fix)
    }
}

fn parse_replay(contents: &str) -> Vec<LocationFix> {
    let mut fixes = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ReplayRecord>(line) {
            Ok(record) => fixes.push(record.into()),
            Err(err) => {
                warn!(line = index + 1, error = %err, "Skipping malformed replay line");
            }
        }
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const SAMPLE: &str = r#"
# morning commute
{"latitude":45.0,"longitude":7.0,"horizontal_accuracy_m":4.0,"speed_accuracy":0.5,"speed_mps":10.0,"timestamp":"1970-01-01T00:00:00Z"}
not json at all
{"latitude":45.0001,"longitude":7.0,"horizontal_accuracy_m":4.0,"speed_mps":11.0,"timestamp":"1970-01-01T00:00:02Z"}
"#;

    #[test]
    fn parse_skips_comments_and_malformed_lines() {
        let fixes = parse_replay(SAMPLE);

        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[0].raw_speed_mps, 10.0);
        assert_eq!(fixes[1].speed_accuracy, 0.0);
        assert_eq!(fixes[1].timestamp, UNIX_EPOCH + Duration::from_secs(2));
    }

    #[test]
    fn delay_scales_with_playback_rate_and_is_capped() {
        let fixes = parse_replay(SAMPLE);
        let mut provider = ReplayProvider::new(fixes.clone(), 2.0);

        assert_eq!(provider.delay_before(&fixes[0]), Duration::ZERO);

        provider.last_timestamp = Some(fixes[0].timestamp);
        assert_eq!(provider.delay_before(&fixes[1]), Duration::from_secs(1));

        let mut late = fixes[1].clone();
        late.timestamp = UNIX_EPOCH + Duration::from_secs(600);
        assert_eq!(provider.delay_before(&late), MAX_REPLAY_GAP / 2);
    }

    #[test]
    fn invalid_playback_rate_falls_back_to_real_time() {
        let provider = ReplayProvider::new(Vec::new(), 0.0);

        assert_eq!(provider.playback_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_yields_all_fixes_then_ends() {
        let mut provider = ReplayProvider::new(parse_replay(SAMPLE), 1.0);

        assert!(provider.next_fix().await.is_some());
        assert!(provider.next_fix().await.is_some());
        assert!(provider.next_fix().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_does_not_lose_the_fix() {
        let mut provider = ReplayProvider::new(parse_replay(SAMPLE), 1.0);
        provider.next_fix().await.expect("first fix");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(500), provider.next_fix()).await;
        assert!(cancelled.is_err());

        let second = provider.next_fix().await.expect("second fix still queued");
        assert_eq!(second.raw_speed_mps, 11.0);
    }

    #[tokio::test]
    async fn missing_file_returns_read_error() {
        let path = std::env::temp_dir().join("roadspeed-replay-does-not-exist.jsonl");

        let result = ReplayProvider::from_path(&path, 1.0).await;

        assert!(matches!(result, Err(LocationError::Read(_))));
    }
}
