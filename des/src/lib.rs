//! Minimal deterministic, process-based discrete-event simulation.
//!
//! - [`EventQueue`] holds the clock and pending events, ordered by due time
//!   and then by insertion sequence.
//! - [`Simulation`] owns processes and resumes them one at a time as their
//!   events fire. Processes are explicit state machines implementing
//!   [`Process`]; they suspend by returning a [`Step`].
//! - [`ResourcePool`] models N identical servers with a FIFO or priority
//!   wait list.
//! - [`parallel`] runs independent replications side by side.
//!
//! Given the same processes and the same random draws, two runs produce
//! identical event orders.

mod error;
pub mod parallel;
mod process;
mod queue;
mod resource;
mod simulation;

pub use error::SimError;
pub use process::{Process, ProcessId, ProcessState, Step, Suspension, Wake};
pub use queue::{Event, EventKey, EventQueue};
pub use resource::{Admission, PoolId, PoolStats, QueuePolicy, ResourcePool, WaitEntry};
pub use simulation::{Context, RunSummary, Simulation};

/// Simulated time, in arbitrary units (minutes in the bank model).
pub type SimTime = f64;
