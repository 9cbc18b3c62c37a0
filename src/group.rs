//! `MessageGroup` — all copies of one raw Mode S message across receivers.

use std::collections::HashSet;

use crate::observation::Observation;
use crate::receiver::ReceiverId;

#[derive(Debug, Clone)]
pub struct MessageGroup {
    pub message: Vec<u8>,
    /// Wall time of the first copy seen.
    pub first_seen: f64,
    /// Bounded sequence of observations, capped at `config.max_group`.
    pub copies: Vec<Observation>,
    /// Every receiver that reported this message, including those dropped
    /// from `copies` once the cap was hit.
    pub receivers: HashSet<ReceiverId>,
}

impl MessageGroup {
    pub fn new(message: Vec<u8>, first_seen: f64) -> Self {
        Self {
            message,
            first_seen,
            copies: Vec::new(),
            receivers: HashSet::new(),
        }
    }

    /// Record a copy of this message from `receiver`. Always adds the
    /// receiver to `receivers`; only appends to `copies` while under
    /// `max_group` (excess copies are dropped, not the receiver credit).
    pub fn record(&mut self, obs: Observation, max_group: usize) {
        self.receivers.insert(obs.receiver);
        if self.copies.len() > max_group {
            return;
        }
        self.copies.push(obs);
    }
}
