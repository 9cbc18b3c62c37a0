//! Output collaborators — where an accepted solve goes once the resolve
//! pipeline is done with it. Two distinct sinks, both invoked once per
//! accepted result: registered handlers get the solved fix; the
//! forwarder tells every receiver that heard the message (not just the
//! ones in the winning cluster) that a solve happened.

use std::collections::HashSet;

use crate::receiver::ReceiverId;
use crate::solver::{Ecef, EcefCov};

/// Everything a sink needs about one accepted solve. Borrowed for the
/// duration of the dispatch call only.
pub struct SolveOutput<'a> {
    pub cluster_wall_ts: f64,
    pub address: u32,
    pub ecef: Ecef,
    pub ecef_cov: EcefCov,
    pub cluster_receivers: &'a [ReceiverId],
    pub distinct: usize,
    pub dof: i32,
    /// Whether the Kalman filter accepted this update.
    pub kalman: bool,
    pub error_m: f64,
}

/// A registered sink for solved fixes (e.g. a network feed, a database
/// writer). Invoked in registration order; an error is logged and
/// skipped, never propagated: one misbehaving sink must not stop the others
/// or unwind the resolve pipeline.
pub trait OutputHandler: Send {
    fn handle(&mut self, output: &SolveOutput<'_>) -> Result<(), String>;
}

/// Tells every receiver that heard the raw message (the Group's full
/// receiver set, not just the receivers in the winning cluster) that a
/// solve happened for it.
pub trait ResultForwarder: Send {
    fn forward_results(&mut self, receivers: &HashSet<ReceiverId>, output: &SolveOutput<'_>);
}
