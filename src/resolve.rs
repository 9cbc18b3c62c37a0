//! Resolve Pipeline — `on_resolve(group)`: decode, gate, cluster, solve,
//! dispatch. Direct translation of the reference server's `_resolve`, kept
//! as an ordered chain of early returns (`GateOutcome`) the way
//! `procedure_engine.rs` represents "what happened this tick" explicitly
//! rather than via exceptions.

use std::collections::HashMap;

use tracing::warn;

use crate::aircraft::{AircraftState, AircraftTracker};
use crate::clock::{ClockTracker, TimestampMap};
use crate::cluster::{cluster_timestamps, Cluster};
use crate::config::{TrackerConfig, FT_TO_M};
use crate::decode::Decoder;
use crate::geodesy::{ecef_to_llh, ecef_with_height};
use crate::group::MessageGroup;
use crate::receiver::ReceiverArena;
use crate::solver::{trace, Solver};
use crate::stats::Stats;

/// Why a resolution stopped, for logging/testing. Not an error — every
/// variant but the two decode/lookup ones is ordinary gate control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    TooFewCopies,
    DecodeFailed,
    UnknownAircraft,
    WrongPartition,
    RateLimited,
    BackoffNotElapsed,
    InsufficientDof,
    ClockNormalizeFailed(String),
    NoClusters,
    NoAcceptableCluster,
    Resolved { distinct: usize, dof: i32 },
}

/// Everything the resolve pipeline needs from the outside world for one
/// call. Borrowed for the duration of the call only.
pub struct Collaborators<'a> {
    pub decoder: &'a dyn Decoder,
    pub clock_tracker: &'a dyn ClockTracker,
    pub solver: &'a dyn Solver,
    pub arena: &'a ReceiverArena,
}

/// Run the resolve pipeline for one group against one aircraft's state.
/// The caller (the tracker's actor loop) is responsible for looking up
/// `ac` by the decoded address and for dispatching accepted results to
/// output handlers / the pseudorange recorder — this function reports the
/// outcome plus (on success) enough detail to do both.
pub fn resolve_group(
    group: &MessageGroup,
    now: f64,
    config: &TrackerConfig,
    collab: &Collaborators<'_>,
    aircraft_tracker: &mut dyn AircraftTracker,
    stats: &mut Stats,
) -> (GateOutcome, Option<ResolvedSolve>) {
    if group.copies.len() < 3 {
        return (GateOutcome::TooFewCopies, None);
    }

    let Some(decoded) = collab.decoder.decode(&group.message) else {
        return (GateOutcome::DecodeFailed, None);
    };
    let Some(address) = decoded.address else {
        return (GateOutcome::DecodeFailed, None);
    };

    let Some((ac, kalman)) = aircraft_tracker.get_mut(address) else {
        return (GateOutcome::UnknownAircraft, None);
    };

    ac.seen = Some(now);
    ac.mlat_message_count += 1;
    stats.valid_groups += 1;

    if !ac.allow_mlat {
        warn!("not doing mlat for {address:06x}, wrong partition");
        return (GateOutcome::WrongPartition, None);
    }

    update_altitude_state(ac, &decoded, group.first_seen);
    if let Some(squawk) = decoded.squawk {
        ac.squawk = Some(squawk);
    }
    if let Some(callsign) = decoded.callsign.clone() {
        ac.callsign = Some(callsign);
    }

    if now - ac.last_resolve_attempt < config.resolve_interval.as_secs_f64() {
        return (GateOutcome::RateLimited, None);
    }
    ac.last_resolve_attempt = now;

    let (last_result_position, last_result_dof, last_result_time) =
        if ac.last_result_position.is_none() || (group.first_seen - ac.last_result_time) > 120.0 {
            (None, 0, group.first_seen - 120.0)
        } else {
            (
                ac.last_result_position,
                ac.last_result_dof,
                ac.last_result_time,
            )
        };

    let elapsed = (group.first_seen - last_result_time).max(0.0);
    if elapsed < config.resolve_backoff.as_secs_f64() {
        return (GateOutcome::BackoffNotElapsed, None);
    }

    let (altitude, altitude_dof) = altitude_constraint(ac, group.first_seen, config);

    let max_dof = group.copies.len() as i32 + altitude_dof - 4;
    if max_dof < 0 {
        return (GateOutcome::InsufficientDof, None);
    }
    if elapsed < 2.0 * config.resolve_backoff.as_secs_f64()
        && (max_dof as f64) < (last_result_dof as f64 - elapsed + 0.5)
    {
        return (GateOutcome::InsufficientDof, None);
    }

    let mut timestamp_map: TimestampMap = HashMap::new();
    for obs in &group.copies {
        timestamp_map
            .entry(obs.receiver)
            .or_default()
            .push((obs.local_ts, obs.wall_ts));
    }

    let dof = timestamp_map.len() as i32 + altitude_dof - 4;
    if dof < 0 {
        return (GateOutcome::InsufficientDof, None);
    }
    if elapsed < 2.0 * config.resolve_backoff.as_secs_f64()
        && (dof as f64) < (last_result_dof as f64 - elapsed + 0.5)
    {
        return (GateOutcome::InsufficientDof, None);
    }

    stats.normalize_attempts += 1;
    let components = match collab.clock_tracker.normalize(&timestamp_map) {
        Ok(c) => c,
        Err(e) => {
            warn!("clock normalize failed: {e}");
            return (GateOutcome::ClockNormalizeFailed(e), None);
        }
    };

    let min_component_size = (4 - altitude_dof).max(0) as usize;
    let mut clusters: Vec<Cluster> = Vec::new();
    for component in &components {
        if component.len() >= min_component_size {
            clusters.extend(cluster_timestamps(component, collab.arena, min_component_size));
        }
    }

    if clusters.is_empty() {
        return (GateOutcome::NoClusters, None);
    }

    clusters.sort_by(|a, b| {
        a.distinct
            .cmp(&b.distinct)
            .then(a.first_wall_ts.partial_cmp(&b.first_wall_ts).unwrap())
    });

    while let Some(cluster) = clusters.pop() {
        let cluster_wall_ts = cluster.first_wall_ts;
        let elapsed_c = cluster_wall_ts - last_result_time;
        let dof_c = cluster.distinct as i32 + altitude_dof - 4;

        if elapsed_c < 2.0 && (dof_c as f64) < (last_result_dof as f64 - elapsed_c + 0.5) {
            // A fresher/higher-quality result already exists: abort the whole
            // resolution here rather than trying the next-best cluster.
            return (GateOutcome::NoAcceptableCluster, None);
        }

        let altitude_error = if decoded.altitude.is_some() {
            Some(250.0 * FT_TO_M)
        } else if altitude.is_some() {
            Some((250.0 + (cluster_wall_ts - ac.last_altitude_time.unwrap_or(cluster_wall_ts)) * 70.0) * FT_TO_M)
        } else {
            None
        };

        if elapsed_c > 30.0 && dof_c == 0 {
            continue;
        }

        let initial_guess = if elapsed_c < 60.0 {
            match last_result_position {
                Some(p) => p,
                None => match cluster.rows.first() {
                    Some(row) => collab
                        .arena
                        .get(row.receiver)
                        .map(|r| r.position)
                        .unwrap_or([0.0, 0.0, 0.0]),
                    None => [0.0, 0.0, 0.0],
                },
            }
        } else {
            match cluster.rows.first() {
                Some(row) => collab
                    .arena
                    .get(row.receiver)
                    .map(|r| r.position)
                    .unwrap_or([0.0, 0.0, 0.0]),
                None => [0.0, 0.0, 0.0],
            }
        };

        stats.solve_attempts += 1;
        let Some(result) = collab.solver.solve(&cluster, altitude, altitude_error, initial_guess) else {
            continue;
        };
        let Some(ecef_cov) = result.ecef_cov else {
            continue;
        };

        let var_est = trace(&ecef_cov).abs();
        let error = var_est.sqrt();
        const MAX_ERROR: f64 = 10_000.0;
        if error > MAX_ERROR {
            continue;
        }
        stats.solve_success += 1;

        if elapsed_c / 20.0 < error / MAX_ERROR {
            continue;
        }
        stats.solve_used += 1;

        ac.last_result_position = Some(result.ecef);
        ac.last_result_var = var_est;
        ac.last_result_dof = dof_c;
        ac.last_result_time = cluster_wall_ts;
        ac.mlat_result_count += 1;

        let kalman_ecef = if let Some(alt) = altitude {
            ecef_with_height(result.ecef, alt)
        } else {
            result.ecef
        };
        let (kalman_altitude, kalman_alt_error) = if let Some(alt) = altitude {
            (alt, altitude_error.unwrap_or(0.0))
        } else {
            let [_, _, solved_alt] = ecef_to_llh(result.ecef);
            (solved_alt, 4000.0 / ((dof_c + 1) as f64).sqrt())
        };

        let kalman_accepted = kalman.update(
            cluster_wall_ts,
            kalman_altitude,
            kalman_alt_error,
            kalman_ecef,
            Some(ecef_cov),
            cluster.distinct,
            dof_c,
        );
        if kalman_accepted {
            ac.mlat_kalman_count += 1;
        }

        return (
            GateOutcome::Resolved {
                distinct: cluster.distinct,
                dof: dof_c,
            },
            Some(ResolvedSolve {
                address,
                cluster_wall_ts,
                ecef: result.ecef,
                ecef_cov,
                distinct: cluster.distinct,
                dof: dof_c,
                error,
                altitude,
                altitude_error,
                kalman_accepted,
                cluster,
            }),
        );
    }

    (GateOutcome::NoAcceptableCluster, None)
}

/// Detail about an accepted solve the caller needs to dispatch to output
/// handlers, forward to receivers, and (optionally) record.
pub struct ResolvedSolve {
    pub address: u32,
    pub cluster_wall_ts: f64,
    pub ecef: crate::solver::Ecef,
    pub ecef_cov: crate::solver::EcefCov,
    pub distinct: usize,
    pub dof: i32,
    pub error: f64,
    pub altitude: Option<f64>,
    pub altitude_error: Option<f64>,
    pub kalman_accepted: bool,
    pub cluster: Cluster,
}

fn update_altitude_state(
    ac: &mut AircraftState,
    decoded: &crate::decode::DecodedMessage,
    first_seen: f64,
) {
    let Some(alt) = decoded.altitude else {
        return;
    };
    if !(alt > -1500.0 && alt < 75000.0) {
        return;
    }

    let accept = match ac.last_altitude_time {
        None => true,
        Some(last) => {
            first_seen > last
                && (first_seen - last > 15.0 || (ac.altitude.unwrap_or(alt) - alt).abs() < 4000.0)
        }
    };
    if !accept {
        return;
    }

    ac.altitude = Some(alt);
    ac.last_altitude_time = Some(first_seen);

    ac.alt_history.retain(|(ts, _)| first_seen - ts < 20.0);
    ac.alt_history.push((first_seen, alt));

    let (oldest_ts, oldest_alt) = ac.alt_history[0];
    let ts_diff = first_seen - oldest_ts;
    if ts_diff > 10.0 {
        let new_vrate = (alt - oldest_alt) / (ts_diff / 60.0);
        ac.vrate = Some(match ac.vrate {
            Some(prev) if ac.vrate_time.map(|t| first_seen - t < 15.0).unwrap_or(false) => {
                prev + 0.3 * (new_vrate - prev)
            }
            _ => new_vrate,
        });
        ac.vrate_time = Some(first_seen);
    }
}

fn altitude_constraint(
    ac: &AircraftState,
    first_seen: f64,
    config: &TrackerConfig,
) -> (Option<f64>, i32) {
    let stale = ac
        .last_altitude_time
        .map(|t| first_seen > t + 45.0)
        .unwrap_or(true);
    match ac.altitude {
        Some(alt_ft) if alt_ft >= config.min_alt_ft && alt_ft <= config.max_alt_ft && !stale => {
            (Some(alt_ft * FT_TO_M), 1)
        }
        _ => (None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use crate::receiver::ReceiverArena;
    use crate::testutil::{
        FailingClockTracker, FakeAircraftTracker, FakeDecoder, FixedSolver, IdentityClockTracker,
        NeverSolver,
    };

    const ICAO: u32 = 0x1234;

    fn message() -> Vec<u8> {
        vec![0xAA]
    }

    fn decoder() -> FakeDecoder {
        FakeDecoder::with(
            message(),
            DecodedMessage {
                address: Some(ICAO),
                ..Default::default()
            },
        )
    }

    fn arena_four_receivers() -> ReceiverArena {
        let mut arena = ReceiverArena::new();
        for (id, x) in [(1, 0.0), (2, 2000.0), (3, 4000.0), (4, 6000.0)] {
            arena.insert(id, [x, 0.0, 0.0]);
        }
        arena
    }

    fn group_with_copies(receivers: &[u32], wall_ts: f64) -> MessageGroup {
        let mut group = MessageGroup::new(message(), wall_ts);
        for &r in receivers {
            group.record(
                Observation {
                    receiver: r,
                    local_ts: 0.0,
                    wall_ts,
                },
                30,
            );
        }
        group
    }

    #[test]
    fn too_few_copies_aborts_before_decode() {
        let group = group_with_copies(&[1, 2], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = IdentityClockTracker::default();
        let solver = FixedSolver::default();
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::with_known(ICAO);
        let mut stats = Stats::default();
        let (outcome, resolved) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);
        assert_eq!(outcome, GateOutcome::TooFewCopies);
        assert!(resolved.is_none());
    }

    #[test]
    fn unknown_aircraft_aborts() {
        let group = group_with_copies(&[1, 2, 3], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = IdentityClockTracker::default();
        let solver = FixedSolver::default();
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::default();
        let mut stats = Stats::default();
        let (outcome, _) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);
        assert_eq!(outcome, GateOutcome::UnknownAircraft);
    }

    #[test]
    fn under_dof_without_altitude_aborts() {
        // Boundary scenario 1: 3 receivers, no altitude -> max_dof = -1.
        let group = group_with_copies(&[1, 2, 3], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = IdentityClockTracker::default();
        let solver = FixedSolver::default();
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::with_known(ICAO);
        let mut stats = Stats::default();
        let (outcome, resolved) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);
        assert_eq!(outcome, GateOutcome::InsufficientDof);
        assert!(resolved.is_none());
    }

    #[test]
    fn clock_normalize_failure_is_logged_and_aborts() {
        let group = group_with_copies(&[1, 2, 3], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = FailingClockTracker;
        let solver = FixedSolver::default();
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::with_known(ICAO);
        {
            let (ac, _) = tracker.get_mut(ICAO).unwrap();
            ac.altitude = Some(10_000.0);
            ac.last_altitude_time = Some(1000.0);
        }
        let mut stats = Stats::default();
        let (outcome, _) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);
        assert_eq!(
            outcome,
            GateOutcome::ClockNormalizeFailed("synthetic clock failure".to_string())
        );
    }

    #[test]
    fn solver_miss_leaves_cluster_loop_empty_handed() {
        let group = group_with_copies(&[1, 2, 3, 4], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = IdentityClockTracker::default();
        let solver = NeverSolver;
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::with_known(ICAO);
        {
            let (ac, _) = tracker.get_mut(ICAO).unwrap();
            ac.altitude = Some(10_000.0);
            ac.last_altitude_time = Some(1000.0);
        }
        let mut stats = Stats::default();
        let (outcome, resolved) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);
        assert_eq!(outcome, GateOutcome::NoAcceptableCluster);
        assert!(resolved.is_none());
    }

    #[test]
    fn full_resolution_dispatches_to_kalman_and_updates_aircraft_state() {
        // Boundary scenario 2: tracked altitude gives altitude_dof = 1, so 4
        // distinct receivers clear every DOF gate and a fix is accepted.
        let group = group_with_copies(&[1, 2, 3, 4], 1000.0);
        let config = TrackerConfig::default();
        let decoder = decoder();
        let clock_tracker = IdentityClockTracker::default();
        let solver = FixedSolver::default();
        let arena = arena_four_receivers();
        let collab = Collaborators {
            decoder: &decoder,
            clock_tracker: &clock_tracker,
            solver: &solver,
            arena: &arena,
        };
        let mut tracker = FakeAircraftTracker::with_known(ICAO);
        {
            let (ac, _) = tracker.get_mut(ICAO).unwrap();
            ac.altitude = Some(10_000.0);
            ac.last_altitude_time = Some(1000.0);
        }
        let mut stats = Stats::default();
        let (outcome, resolved) =
            resolve_group(&group, 1000.0, &config, &collab, &mut tracker, &mut stats);

        assert_eq!(
            outcome,
            GateOutcome::Resolved {
                distinct: 4,
                dof: 1
            }
        );
        let resolved = resolved.expect("accepted solve");
        assert_eq!(resolved.address, ICAO);
        assert!(resolved.kalman_accepted);
        assert_eq!(tracker.kalman_updates(ICAO).len(), 1);
        assert_eq!(tracker.state(ICAO).unwrap().mlat_result_count, 1);
        assert_eq!(tracker.state(ICAO).unwrap().mlat_kalman_count, 1);
    }
}
