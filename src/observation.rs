use crate::receiver::ReceiverId;

/// One receiver's report of one message arrival.
///
/// `local_ts` is the receiver's own uncorrected clock reading of the
/// arrival, in seconds; `wall_ts` is this server's wall-clock reception
/// time, also in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub receiver: ReceiverId,
    pub local_ts: f64,
    pub wall_ts: f64,
}
