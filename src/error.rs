use std::io;

use thiserror::Error;

/// Everything that can go wrong inside the benchmark core. Every variant
/// is fatal; `main` logs the error and exits non-zero. Calibration that
/// fails to converge is not represented here; that path logs a warning
/// and proceeds with the last acceptable parameters.
#[derive(Debug, Error)]
pub enum RtBenchError {
    /// A programmer error or invariant violation: building or sampling an
    /// empty distribution, a failed strict-timer assertion, cpu-id drift
    /// during a TSC measurement, a zero scaled-division denominator, or an
    /// out-of-range confidence fraction.
    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    /// Resource exhaustion: an allocation failure or a failed system call
    /// while reading a timestamp or probing CPU topology.
    #[error("{op} failed: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RtBenchError {
    pub fn resource(op: &'static str, source: io::Error) -> Self {
        RtBenchError::Resource { op, source }
    }
}

pub type Result<T> = std::result::Result<T, RtBenchError>;
