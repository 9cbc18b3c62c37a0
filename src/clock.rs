//! Clock tracker collaborator — given a map of receiver → local
//! timestamps, returns connected components of receivers whose clocks can
//! be linearly related. Treated as an interface only.

use std::collections::HashMap;

use crate::cluster::Component;
use crate::receiver::ReceiverId;

/// Per-receiver raw `(local_ts, wall_ts)` pairs to be normalized into a
/// common clock domain.
pub type TimestampMap = HashMap<ReceiverId, Vec<(f64, f64)>>;

/// Aligns receiver clocks and partitions them into connected components
/// with directly-comparable normalized timestamps.
///
/// Returning `Err` aborts the whole resolution for this group (§4.3 step
/// 13, "log and abort"); it is not expected to happen in normal operation
/// and the pipeline treats it as a log-once condition, not a per-cluster
/// gate.
pub trait ClockTracker: Send {
    fn normalize(&self, timestamp_map: &TimestampMap) -> Result<Vec<Component>, String>;
}
