//! Hand-written fake collaborators for exercising the resolve pipeline and
//! actor loop without a real decoder/clock-sync/solver implementation,
//! analogous to the reference server's mock collaborators for its
//! procedure engine tests.

use std::collections::HashMap;

use crate::aircraft::{AircraftState, AircraftTracker, KalmanFilter};
use crate::clock::{ClockTracker, TimestampMap};
use crate::cluster::{Component, ComponentEntry};
use crate::decode::{DecodedMessage, Decoder};
use crate::output::{OutputHandler, ResultForwarder, SolveOutput};
use crate::receiver::ReceiverId;
use crate::solver::{Ecef, EcefCov, SolveResult, Solver};

/// Decodes any message by looking it up in a fixed table keyed by the raw
/// bytes; unknown messages decode to `None`.
#[derive(Default)]
pub struct FakeDecoder {
    pub table: HashMap<Vec<u8>, DecodedMessage>,
}

impl FakeDecoder {
    pub fn with(message: Vec<u8>, decoded: DecodedMessage) -> Self {
        let mut table = HashMap::new();
        table.insert(message, decoded);
        Self { table }
    }
}

impl Decoder for FakeDecoder {
    fn decode(&self, message: &[u8]) -> Option<DecodedMessage> {
        self.table.get(message).cloned()
    }
}

/// Treats every receiver in the timestamp map as already comparable: one
/// component containing every entry, normalized timestamp equal to local
/// timestamp, fixed variance.
pub struct IdentityClockTracker {
    pub variance: f64,
}

impl Default for IdentityClockTracker {
    fn default() -> Self {
        Self { variance: 1e-12 }
    }
}

impl ClockTracker for IdentityClockTracker {
    fn normalize(&self, timestamp_map: &TimestampMap) -> Result<Vec<Component>, String> {
        let mut component: Component = Vec::new();
        for (&receiver, samples) in timestamp_map {
            for &(local_ts, wall_ts) in samples {
                component.push(ComponentEntry {
                    receiver,
                    normalized_ts: local_ts,
                    variance: self.variance,
                    wall_ts,
                });
            }
        }
        Ok(vec![component])
    }
}

/// A clock tracker that always fails, for exercising the log-and-abort path.
pub struct FailingClockTracker;

impl ClockTracker for FailingClockTracker {
    fn normalize(&self, _timestamp_map: &TimestampMap) -> Result<Vec<Component>, String> {
        Err("synthetic clock failure".to_string())
    }
}

/// Always returns a fixed position with a small, fixed covariance.
pub struct FixedSolver {
    pub ecef: Ecef,
    pub ecef_cov: EcefCov,
}

impl Default for FixedSolver {
    fn default() -> Self {
        Self {
            ecef: [0.0, 0.0, 0.0],
            ecef_cov: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl Solver for FixedSolver {
    fn solve(
        &self,
        _cluster: &crate::cluster::Cluster,
        _altitude: Option<f64>,
        _altitude_error: Option<f64>,
        _initial_guess: Ecef,
    ) -> Option<SolveResult> {
        Some(SolveResult {
            ecef: self.ecef,
            ecef_cov: Some(self.ecef_cov),
        })
    }
}

/// A solver that never produces a usable result.
pub struct NeverSolver;

impl Solver for NeverSolver {
    fn solve(
        &self,
        _cluster: &crate::cluster::Cluster,
        _altitude: Option<f64>,
        _altitude_error: Option<f64>,
        _initial_guess: Ecef,
    ) -> Option<SolveResult> {
        None
    }
}

/// A Kalman filter fake that records every call and always accepts.
#[derive(Default)]
pub struct RecordingKalmanFilter {
    pub updates: Vec<(f64, Ecef)>,
    pub accept: bool,
}

impl KalmanFilter for RecordingKalmanFilter {
    fn update(
        &mut self,
        wall_ts: f64,
        _altitude: f64,
        _altitude_error: f64,
        ecef: Ecef,
        _ecef_cov: Option<EcefCov>,
        _distinct: usize,
        _dof: i32,
    ) -> bool {
        self.updates.push((wall_ts, ecef));
        self.accept
    }
}

impl RecordingKalmanFilter {
    pub fn accepting() -> Self {
        Self {
            updates: Vec::new(),
            accept: true,
        }
    }
}

/// In-memory aircraft tracker over a fixed table of known ICAO addresses.
#[derive(Default)]
pub struct FakeAircraftTracker {
    states: HashMap<u32, (AircraftState, RecordingKalmanFilter)>,
}

impl FakeAircraftTracker {
    pub fn with_known(icao: u32) -> Self {
        let mut states = HashMap::new();
        states.insert(
            icao,
            (
                AircraftState {
                    icao,
                    allow_mlat: true,
                    ..Default::default()
                },
                RecordingKalmanFilter::accepting(),
            ),
        );
        Self { states }
    }

    pub fn state(&self, icao: u32) -> Option<&AircraftState> {
        self.states.get(&icao).map(|(ac, _)| ac)
    }

    pub fn kalman_updates(&self, icao: u32) -> &[(f64, Ecef)] {
        self.states
            .get(&icao)
            .map(|(_, k)| k.updates.as_slice())
            .unwrap_or(&[])
    }
}

impl AircraftTracker for FakeAircraftTracker {
    fn get_mut(&mut self, icao: u32) -> Option<(&mut AircraftState, &mut dyn KalmanFilter)> {
        self.states
            .get_mut(&icao)
            .map(|(ac, k)| (ac, k as &mut dyn KalmanFilter))
    }
}

/// Records every accepted solve handed to it; never errors.
#[derive(Default)]
pub struct RecordingOutputHandler {
    pub seen: Vec<u32>,
}

impl OutputHandler for RecordingOutputHandler {
    fn handle(&mut self, output: &SolveOutput<'_>) -> Result<(), String> {
        self.seen.push(output.address);
        Ok(())
    }
}

/// Records the full receiver set of every forwarded result.
#[derive(Default)]
pub struct RecordingForwarder {
    pub forwarded: Vec<Vec<ReceiverId>>,
}

impl ResultForwarder for RecordingForwarder {
    fn forward_results(
        &mut self,
        receivers: &std::collections::HashSet<ReceiverId>,
        _output: &SolveOutput<'_>,
    ) {
        let mut v: Vec<ReceiverId> = receivers.iter().copied().collect();
        v.sort_unstable();
        self.forwarded.push(v);
    }
}
