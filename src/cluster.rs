//! Cluster Engine — a pure function turning a clock-normalized `Component`
//! into zero or more self-consistent `Cluster`s.
//!
//! Direct translation of the reference server's `_cluster_timestamps`:
//! flatten, sort by normalized timestamp, rough-split on >2ms gaps between
//! consecutive items, then within each rough group repeatedly peel the
//! latest-timestamp item off as a cluster seed and pull in everything
//! within 2ms and pairwise range/time consistent with what's already in
//! the cluster.

use crate::config::C_AIR;
use crate::receiver::{ReceiverArena, ReceiverId};

/// Cluster width cap and rough-grouping gap, in seconds.
const CLUSTER_WIDTH_S: f64 = 2e-3;
/// Co-location threshold below which two receivers count as one for the
/// distinct-receiver requirement.
const COLOCATION_M: f64 = 1e3;
/// Range/time consistency slack: 5% of distance plus this many metres.
const SLACK_M: f64 = 1e3;
const SLACK_FRACTION: f64 = 1.05;

/// One receiver's normalized-timestamp report within a `Component`.
#[derive(Debug, Clone, Copy)]
pub struct ComponentEntry {
    pub receiver: ReceiverId,
    /// Normalized timestamp, seconds, comparable across receivers in the
    /// same component.
    pub normalized_ts: f64,
    /// Variance of the normalized timestamp, seconds².
    pub variance: f64,
    /// Server wall-clock time of this observation, seconds.
    pub wall_ts: f64,
}

/// A maximal set of receivers whose clocks have been linearized to a
/// common domain by the (external) clock tracker.
pub type Component = Vec<ComponentEntry>;

/// One row of an emitted cluster: a receiver's normalized timestamp and
/// variance, judged consistent with every other row in the cluster.
#[derive(Debug, Clone, Copy)]
pub struct ClusterRow {
    pub receiver: ReceiverId,
    pub normalized_ts: f64,
    pub variance: f64,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Number of distinct receivers (co-located receivers, <1km apart,
    /// count once).
    pub distinct: usize,
    /// Earliest wall-clock time among the rows in the cluster.
    pub first_wall_ts: f64,
    /// Ascending-normalized-timestamp rows.
    pub rows: Vec<ClusterRow>,
}

/// Extract clusters from a clock-normalized component.
///
/// `min_receivers` is `4 - altitude_dof` (3 or 4): the minimum distinct
/// receiver count a cluster needs to be worth handing to the solver.
/// Pure: does not mutate `component` or `arena`, safe to run off the
/// tracker's actor task.
pub fn cluster_timestamps(
    component: &Component,
    arena: &ReceiverArena,
    min_receivers: usize,
) -> Vec<Cluster> {
    if component.is_empty() {
        return Vec::new();
    }

    let mut flat: Vec<ComponentEntry> = component.clone();
    flat.sort_by(|a, b| a.normalized_ts.partial_cmp(&b.normalized_ts).unwrap());

    // Rough grouping: split wherever the gap between *consecutive* items
    // exceeds 2ms. A rough group may still span much more than 2ms overall.
    let mut rough_groups: Vec<Vec<ComponentEntry>> = Vec::new();
    let mut current: Vec<ComponentEntry> = vec![flat[0]];
    for entry in &flat[1..] {
        if entry.normalized_ts - current.last().unwrap().normalized_ts > CLUSTER_WIDTH_S {
            rough_groups.push(std::mem::take(&mut current));
            current.push(*entry);
        } else {
            current.push(*entry);
        }
    }
    rough_groups.push(current);

    let mut clusters = Vec::new();
    for mut group in rough_groups {
        while group.len() >= min_receivers {
            let seed = group.pop().unwrap();
            let mut cluster: Vec<ComponentEntry> = vec![seed];
            let mut distinct = 1usize;
            let mut first_wall_ts = seed.wall_ts;
            let last_timestamp = seed.normalized_ts;

            let mut i = group.len();
            while i > 0 {
                i -= 1;
                let candidate = group[i];
                if last_timestamp - candidate.normalized_ts > CLUSTER_WIDTH_S {
                    // Can't possibly be part of the same cluster: a different
                    // test from the rough split above, which only bounds the
                    // gap between consecutive items.
                    break;
                }

                let mut can_cluster = true;
                let mut is_distinct = true;
                for member in &cluster {
                    if member.receiver == candidate.receiver {
                        can_cluster = false;
                        break;
                    }
                    let d = arena.distance(candidate.receiver, member.receiver);
                    let max_dt = (SLACK_FRACTION * d + SLACK_M) / C_AIR;
                    if (member.normalized_ts - candidate.normalized_ts).abs() > max_dt {
                        can_cluster = false;
                        break;
                    }
                    if d < COLOCATION_M {
                        is_distinct = false;
                    }
                }

                if can_cluster {
                    cluster.push(candidate);
                    first_wall_ts = first_wall_ts.min(candidate.wall_ts);
                    if is_distinct {
                        distinct += 1;
                    }
                    group.remove(i);
                }
            }

            if distinct >= min_receivers {
                cluster.sort_by(|a, b| a.normalized_ts.partial_cmp(&b.normalized_ts).unwrap());
                clusters.push(Cluster {
                    distinct,
                    first_wall_ts,
                    rows: cluster
                        .into_iter()
                        .map(|e| ClusterRow {
                            receiver: e.receiver,
                            normalized_ts: e.normalized_ts,
                            variance: e.variance,
                        })
                        .collect(),
                });
            }
        }
    }

    clusters
}
