//! Cohorts batch message groups that arrived close together in time so
//! they can be resolved together after a fixed delay, giving slow
//! receivers a chance to report their copy before `_resolve` runs.
//! Direct translation of the reference tracker's `Cohort`: there, rotation
//! is driven by `loop.call_later`; here the actor loop in `tracker.rs`
//! spawns a `tokio::time::sleep` and sends itself a `CohortReady` event
//! (the same self-addressed-channel pattern as `start_uwb_hub`'s task).

use crate::config::TrackerConfig;
use crate::group::MessageGroup;

#[derive(Debug)]
pub struct Cohort {
    pub id: u64,
    pub creation_time: f64,
    pub groups: Vec<MessageGroup>,
}

impl Cohort {
    pub fn new(id: u64, creation_time: f64) -> Self {
        Self {
            id,
            creation_time,
            groups: Vec::new(),
        }
    }

    /// Whether a newly arrived message should start a fresh cohort instead
    /// of joining this one, per the reference tracker's two thresholds.
    pub fn should_rotate(&self, now: f64, config: &TrackerConfig) -> bool {
        now - self.creation_time > config.cohort_max_age.as_secs_f64()
            || self.groups.len() > config.cohort_max_groups
    }

    pub fn push(&mut self, group: MessageGroup) {
        self.groups.push(group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TrackerConfig {
        TrackerConfig::default()
    }

    #[test]
    fn rotates_past_max_age() {
        let cfg = config();
        let cohort = Cohort::new(0, 100.0);
        assert!(!cohort.should_rotate(100.0, &cfg));
        assert!(cohort.should_rotate(100.0 + cfg.cohort_max_age.as_secs_f64() + 0.001, &cfg));
    }

    #[test]
    fn rotates_past_max_groups() {
        let cfg = config();
        let mut cohort = Cohort::new(0, 100.0);
        for i in 0..=cfg.cohort_max_groups {
            cohort.push(MessageGroup::new(vec![i as u8], 100.0));
        }
        assert!(cohort.should_rotate(100.0, &cfg));
    }
}
