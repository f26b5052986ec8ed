use crate::{PoolId, ProcessId, SimTime};
use thiserror::Error;

/// Errors raised by the simulation kernel.
///
/// Apart from the configuration variants, every error here indicates a bug in
/// a process implementation and aborts the run that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("resource pool capacity must be at least 1, got {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("horizon must be a non-negative time, got {horizon}")]
    InvalidHorizon { horizon: SimTime },

    #[error("cannot schedule with negative delay {delay}")]
    NegativeDelay { delay: SimTime },

    #[error("process {process} resumed without a matching suspension")]
    DoubleResume { process: ProcessId },

    #[error("process {process} requested pool {pool} while already holding a slot")]
    DuplicateRequest { process: ProcessId, pool: PoolId },

    #[error("process {process} released pool {pool} without holding a slot")]
    ReleaseWithoutGrant { process: ProcessId, pool: PoolId },

    #[error("process {process} terminated while still holding a slot in pool {pool}")]
    TerminatedHolding { process: ProcessId, pool: PoolId },

    #[error("unknown resource pool {pool}")]
    UnknownPool { pool: PoolId },
}

impl SimError {
    /// True for errors caused by bad inputs rather than by a faulty process.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SimError::InvalidCapacity { .. } | SimError::InvalidHorizon { .. }
        )
    }
}
