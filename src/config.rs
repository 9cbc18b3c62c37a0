//! Runtime tuning constants for the tracker.
//!
//! Mirrors the reference server's `UwbHubConfig`: sane defaults, each
//! overridable from the environment so an operator can tune without a
//! rebuild. Loading these from a config *file* is out of scope here.

use std::time::Duration;

/// Speed of radio propagation in air, adjusted for atmosphere (m/s).
pub const C_AIR: f64 = 2.997e8;

/// Feet to metres.
pub const FT_TO_M: f64 = 0.3048;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between a cohort's creation and its resolution.
    pub mlat_delay: Duration,
    /// Per-message copy cap; observations beyond this are dropped (but the
    /// reporting receiver is still recorded).
    pub max_group: usize,
    /// Minimum time between resolve attempts for a single aircraft.
    pub resolve_interval: Duration,
    /// Minimum elapsed-since-last-result before a new resolve is attempted.
    pub resolve_backoff: Duration,
    /// Tracked-altitude validity window, feet.
    pub min_alt_ft: f64,
    pub max_alt_ft: f64,
    /// Cohort rotation thresholds.
    pub cohort_max_age: Duration,
    pub cohort_max_groups: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mlat_delay: Duration::from_millis(
                std::env::var("MLAT_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
            ),
            max_group: std::env::var("MLAT_MAX_GROUP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            resolve_interval: Duration::from_millis(
                std::env::var("MLAT_RESOLVE_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),
            resolve_backoff: Duration::from_millis(
                std::env::var("MLAT_RESOLVE_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2000),
            ),
            min_alt_ft: std::env::var("MLAT_MIN_ALT_FT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-1500.0),
            max_alt_ft: std::env::var("MLAT_MAX_ALT_FT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60000.0),
            cohort_max_age: Duration::from_millis(50),
            cohort_max_groups: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TrackerConfig::default();
        assert!(cfg.mlat_delay.as_millis() > 0);
        assert!(cfg.max_group >= 3);
        assert!(cfg.min_alt_ft < cfg.max_alt_ft);
    }
}
