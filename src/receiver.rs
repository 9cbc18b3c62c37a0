//! Receiver arena.
//!
//! Receivers are interned by a stable integer id rather than carried inline
//! on every observation: a receiver's ECEF position and its precomputed
//! distance to every other receiver are looked up by id, the way
//! `trilateration.rs`'s `AnchorMap` looks up fixed node positions by id.
//! Cluster rows keep only the `ReceiverId`, not a borrowed reference, so
//! they have no lifetime tied to the arena.

use std::collections::HashMap;

/// Stable identifier for a receiver, valid for the lifetime of the arena.
pub type ReceiverId = u32;

#[derive(Debug, Clone)]
pub struct Receiver {
    pub id: ReceiverId,
    /// ECEF position, metres.
    pub position: [f64; 3],
    /// Precomputed distance (metres) to every other receiver, by id.
    distance: HashMap<ReceiverId, f64>,
}

impl Receiver {
    pub fn distance_to(&self, other: ReceiverId) -> f64 {
        self.distance.get(&other).copied().unwrap_or(f64::INFINITY)
    }
}

/// Owns all known receivers and their pairwise distance table.
#[derive(Debug, Default)]
pub struct ReceiverArena {
    receivers: HashMap<ReceiverId, Receiver>,
}

impl ReceiverArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a receiver, recomputing its distance to every
    /// receiver already present (and theirs to it).
    pub fn insert(&mut self, id: ReceiverId, position: [f64; 3]) {
        let mut distance = HashMap::new();
        for (&other_id, other) in self.receivers.iter_mut() {
            let d = euclidean(position, other.position);
            distance.insert(other_id, d);
            other.distance.insert(id, d);
        }
        self.receivers.insert(
            id,
            Receiver {
                id,
                position,
                distance,
            },
        );
    }

    pub fn get(&self, id: ReceiverId) -> Option<&Receiver> {
        self.receivers.get(&id)
    }

    pub fn distance(&self, a: ReceiverId, b: ReceiverId) -> f64 {
        if a == b {
            return 0.0;
        }
        self.receivers
            .get(&a)
            .map(|r| r.distance_to(b))
            .unwrap_or(f64::INFINITY)
    }
}

fn euclidean(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
