//! Tracker-wide counters, mirroring the reference server's `coordinator.stats_*`
//! fields. Plain struct of counters — no metrics crate in the dependency
//! stack, so none is introduced here either.

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Every observation passed to `receiver_mlat`.
    pub mlat_msgs: u64,
    /// Groups that made it past the copy-count/decode/aircraft-lookup gates.
    pub valid_groups: u64,
    /// Groups for which clock normalization was attempted.
    pub normalize_attempts: u64,
    /// Clusters handed to the solver.
    pub solve_attempts: u64,
    /// Solver calls that returned a usable result (covariance present,
    /// error within bound).
    pub solve_success: u64,
    /// Solver results that also passed the output-rate throttle and were
    /// actually accepted.
    pub solve_used: u64,
}
