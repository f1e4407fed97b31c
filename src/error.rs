use thiserror::Error;

use crate::latch::BarrierKind;
use crate::phase::Phase;

#[derive(Debug, Error)]
pub enum RunError {
    /// A barrier can no longer release because a worker exited without signaling it.
    #[error("{phase} {barrier} barrier interrupted: a worker exited without signaling")]
    BarrierInterrupted { phase: Phase, barrier: BarrierKind },

    #[error("run boundary timestamp '{0}' was never recorded")]
    MissingTimestamp(&'static str),

    #[error("invalid target address: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type RunResult<T> = std::result::Result<T, RunError>;
