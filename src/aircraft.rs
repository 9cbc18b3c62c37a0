//! Per-aircraft state mutated by the resolve pipeline, and the external
//! collaborators (`AircraftTracker`, `KalmanFilter`) that own it. This
//! crate never constructs or owns an `AircraftState` directly — it is
//! handed a `&mut AircraftState` by the tracker for the duration of one
//! resolution and never stores a reference past that call.

use crate::solver::{Ecef, EcefCov};

/// One altitude sample in the rolling history used for vertical-rate
/// estimation: `(wall_ts, altitude_ft)`.
pub type AltSample = (f64, f64);

#[derive(Debug, Clone, Default)]
pub struct AircraftState {
    pub icao: u32,

    pub altitude: Option<f64>,
    pub last_altitude_time: Option<f64>,
    /// Rolling window of altitude samples within the last 20s.
    pub alt_history: Vec<AltSample>,
    pub vrate: Option<f64>,
    pub vrate_time: Option<f64>,

    pub squawk: Option<u16>,
    pub callsign: Option<String>,

    pub seen: Option<f64>,
    pub last_resolve_attempt: f64,

    pub last_result_position: Option<Ecef>,
    pub last_result_var: f64,
    pub last_result_dof: i32,
    pub last_result_time: f64,

    pub mlat_message_count: u64,
    pub mlat_result_count: u64,
    pub mlat_kalman_count: u64,

    /// Whether this aircraft is assigned to this server's partition; if
    /// false, the resolve pipeline logs once and aborts (§4.3 step 5).
    pub allow_mlat: bool,
}

/// Looks up mutable per-aircraft state (and its attached Kalman filter) by
/// ICAO address. Ownership of both stays with the implementor; this crate
/// only borrows them for the duration of a resolution. The tracker that
/// owns this collaborator is itself single-owner, running as one actor task
/// with no concurrent access, so a plain `&mut self` is enough — no interior
/// mutability needed.
///
/// Returning both in one call (rather than a separate `kalman_mut`
/// accessor) lets implementors hold them as sibling fields and split the
/// borrow themselves, instead of this crate needing two independent
/// mutable borrows of the same tracker.
pub trait AircraftTracker: Send {
    fn get_mut(&mut self, icao: u32) -> Option<(&mut AircraftState, &mut dyn KalmanFilter)>;
}

/// Per-aircraft Kalman filter fed every accepted solve.
///
/// `cluster_receivers`/`distinct`/`dof` are passed through for filters
/// that weight updates by fix quality; returns whether the update was
/// applied (a rejected update does not increment `mlat_kalman_count`).
pub trait KalmanFilter: Send {
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        wall_ts: f64,
        altitude: f64,
        altitude_error: f64,
        ecef: Ecef,
        ecef_cov: Option<EcefCov>,
        distinct: usize,
        dof: i32,
    ) -> bool;
}
