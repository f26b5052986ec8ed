//! Cooperative processes as explicit resumable state machines.
//!
//! A process never blocks. Each call to [`Process::resume`] runs it from its
//! last suspension point to the next one and returns a [`Step`] describing
//! what it is now waiting for. The scheduler later calls `resume` again with
//! the matching [`Wake`].

use std::fmt;

use crate::{Context, PoolId, SimError, SimTime};

/// Handle for a process owned by a [`crate::Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub(crate) usize);

impl ProcessId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a process is being resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First activation after being spawned.
    Start,
    /// A `Step::Timeout` has elapsed.
    Timeout,
    /// A slot in the pool has been granted to this process.
    Granted(PoolId),
}

/// What a process waits for after returning from `resume`.
///
/// These are the only ways to give up control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Resume with `Wake::Timeout` after the given simulated duration.
    Timeout(SimTime),
    /// Resume with `Wake::Granted` once the pool admits this process.
    /// Lower `priority` is served first under `QueuePolicy::Priority`.
    Request { pool: PoolId, priority: i64 },
    /// The process has finished and will not be resumed again.
    Done,
}

impl Step {
    pub fn request(pool: PoolId) -> Step {
        Step::Request { pool, priority: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    Timeout,
    Resource(PoolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Suspended(Suspension),
    Terminated,
}

impl ProcessState {
    /// Whether a wakeup of kind `wake` is the one this state is waiting for.
    pub fn accepts(&self, wake: Wake) -> bool {
        match (self, wake) {
            (ProcessState::Created, Wake::Start) => true,
            (ProcessState::Suspended(Suspension::Timeout), Wake::Timeout) => true,
            (ProcessState::Suspended(Suspension::Resource(waiting)), Wake::Granted(granted)) => {
                *waiting == granted
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ProcessState::Created | ProcessState::Suspended(_))
    }
}

/// A logical process driven by the scheduler.
///
/// `O` is the record type processes may emit through the context.
pub trait Process<O> {
    fn resume(&mut self, wake: Wake, ctx: &mut Context<'_, O>) -> Result<Step, SimError>;
}
