//! Parallel execution of independent simulation replications
//!
//! Each scenario builds and runs its own [`Simulation`] on a rayon worker, so
//! the kernel itself stays single-threaded. Results come back in scenario
//! order.
//!
//! # Example: 20 seeded replications
//!
//! ```rust
//! use des::parallel::{ParallelRunner, simple_progress_reporter};
//! use des::{Context, Process, SimError, Simulation, Step, Wake};
//!
//! struct Tick(u64);
//!
//! impl Process<u64> for Tick {
//!     fn resume(&mut self, wake: Wake, ctx: &mut Context<'_, u64>) -> Result<Step, SimError> {
//!         if wake == Wake::Timeout {
//!             ctx.emit(self.0);
//!         }
//!         Ok(Step::Timeout(1.0))
//!     }
//! }
//!
//! let results = ParallelRunner::new(20, |scenario_id| {
//!     let seed = 42 + scenario_id as u64;
//!     let mut sim = Simulation::new();
//!     sim.spawn(Tick(seed));
//!     Ok::<_, SimError>(sim)
//! })
//! .progress(simple_progress_reporter(10))
//! .num_threads(4)
//! .run(5.0);
//!
//! for result in &results {
//!     let replication = result.as_ref().unwrap();
//!     assert_eq!(replication.records.len(), 5);
//! }
//! ```
//!
//! # Determinism
//!
//! Results are deterministic when the builder derives every seed from
//! `scenario_id` and processes draw only from their own seeded RNGs. Thread
//! count and completion order do not affect the output.
//!
//! # Error Handling
//!
//! A scenario that panics is returned as [`ScenarioError::Panicked`], one whose
//! builder fails as [`ScenarioError::Build`] and one whose run fails as
//! [`ScenarioError::Simulation`]. Other scenarios continue normally.

use crate::{PoolStats, RunSummary, SimError, SimTime, Simulation};
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError<E> {
    #[error("scenario panicked: {0}")]
    Panicked(String),
    #[error("failed to build scenario: {0}")]
    Build(E),
    #[error(transparent)]
    Simulation(#[from] SimError),
}

/// Everything a finished scenario hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct Replication<O> {
    pub scenario_id: usize,
    pub summary: RunSummary,
    pub records: Vec<O>,
    pub pools: Vec<PoolStats>,
}

type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Executes many independent simulations in parallel
///
/// The builder `F` is called once per scenario, on the worker that runs it,
/// and must return a fresh simulation ready to run.
pub struct ParallelRunner<O, E, F>
where
    F: Fn(usize) -> Result<Simulation<O>, E> + Send + Sync,
    O: Send,
    E: Send,
{
    num_scenarios: usize,
    builder: F,
    num_threads: Option<usize>,
    progress_callback: Option<ProgressCallback>,
    _marker: PhantomData<fn() -> (O, E)>,
}

impl<O, E, F> ParallelRunner<O, E, F>
where
    F: Fn(usize) -> Result<Simulation<O>, E> + Send + Sync,
    O: Send,
    E: Send,
{
    pub fn new(num_scenarios: usize, builder: F) -> Self {
        ParallelRunner {
            num_scenarios,
            builder,
            num_threads: None,
            progress_callback: None,
            _marker: PhantomData,
        }
    }

    /// Set number of threads (defaults to rayon's global pool)
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set progress callback, called with `(completed, total)` after each
    /// scenario finishes.
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Build and run every scenario until `run_until`.
    ///
    /// Returns one result per scenario, in scenario_id order.
    pub fn run(self, run_until: SimTime) -> Vec<Result<Replication<O>, ScenarioError<E>>> {
        let progress_counter = AtomicUsize::new(0);

        let execute = || {
            (0..self.num_scenarios)
                .into_par_iter()
                .map(|scenario_id| {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        run_one(&self.builder, scenario_id, run_until)
                    }));

                    let completed = progress_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = self.progress_callback {
                        callback(completed, self.num_scenarios);
                    }

                    match result {
                        Ok(outcome) => outcome,
                        Err(panic) => Err(ScenarioError::Panicked(panic_message(panic))),
                    }
                })
                .collect::<Vec<_>>()
        };

        let pool = self.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| tracing::warn!("falling back to global rayon pool: {e}"))
                .ok()
        });

        match pool {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }
}

fn run_one<O, E, F>(
    builder: &F,
    scenario_id: usize,
    run_until: SimTime,
) -> Result<Replication<O>, ScenarioError<E>>
where
    F: Fn(usize) -> Result<Simulation<O>, E>,
{
    let mut sim = builder(scenario_id).map_err(ScenarioError::Build)?;
    let summary = sim.run(run_until)?;
    let pools = sim.pool_stats();
    Ok(Replication {
        scenario_id,
        summary,
        records: sim.into_records(),
        pools,
    })
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Run scenarios in parallel with the default thread pool and no progress
/// reporting.
pub fn run_parallel<O, E, F>(
    num_scenarios: usize,
    builder: F,
    run_until: SimTime,
) -> Vec<Result<Replication<O>, ScenarioError<E>>>
where
    F: Fn(usize) -> Result<Simulation<O>, E> + Send + Sync,
    O: Send,
    E: Send,
{
    ParallelRunner::new(num_scenarios, builder).run(run_until)
}

/// Run scenarios in batches of at most `batch_size` to cap how many
/// simulations are held in memory at once.
pub fn run_batched<O, E, F>(
    num_scenarios: usize,
    batch_size: usize,
    builder: F,
    run_until: SimTime,
) -> Vec<Result<Replication<O>, ScenarioError<E>>>
where
    F: Fn(usize) -> Result<Simulation<O>, E> + Send + Sync,
    O: Send,
    E: Send,
{
    let mut all_results = Vec::with_capacity(num_scenarios);

    for batch_start in (0..num_scenarios).step_by(batch_size.max(1)) {
        let batch_end = (batch_start + batch_size.max(1)).min(num_scenarios);
        let batch_results = run_parallel(
            batch_end - batch_start,
            |local_id| builder(batch_start + local_id),
            run_until,
        );
        all_results.extend(batch_results.into_iter().map(|result| {
            result.map(|mut replication| {
                replication.scenario_id += batch_start;
                replication
            })
        }));
    }

    all_results
}

/// Progress callback that prints every `interval` completed scenarios.
pub fn simple_progress_reporter(interval: usize) -> impl Fn(usize, usize) + Send + Sync {
    move |completed, total| {
        if completed % interval.max(1) == 0 || completed == total {
            println!("  Completed {}/{} scenarios", completed, total);
        }
    }
}
