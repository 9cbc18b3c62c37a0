//! Error types for the fallible boundaries of the tracker: the external
//! collaborator traits and the small amount of file I/O this crate owns.
//! Everything inside the resolve pipeline's gate chain is modeled as
//! `Option`/early-return, not as an error — a gate not passing is expected
//! control flow, not a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MlatError {
    #[error("clock normalize failed: {0}")]
    ClockNormalize(String),

    #[error("solver failed: {0}")]
    Solve(String),

    #[error("pseudorange log I/O error: {0}")]
    PseudorangeIo(#[from] std::io::Error),

    #[error("pseudorange record serialization failed: {0}")]
    PseudorangeEncode(#[from] serde_json::Error),
}
