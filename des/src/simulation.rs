//! The cooperative run-loop.

use tracing::{debug, trace};

use crate::{
    Admission, EventQueue, PoolId, PoolStats, Process, ProcessId, ProcessState, QueuePolicy,
    ResourcePool, SimError, SimTime, Step, Suspension, Wake,
};

struct Wakeup {
    process: ProcessId,
    wake: Wake,
}

struct Slot<O> {
    state: ProcessState,
    body: Option<Box<dyn Process<O>>>,
}

/// State shared between the run-loop and the running process.
struct Kernel<O> {
    queue: EventQueue<Wakeup>,
    /// Indexed by `ProcessId`, never reused. A terminated process keeps
    /// only its state here; its body is dropped when it finishes.
    slots: Vec<Slot<O>>,
    pools: Vec<ResourcePool>,
    records: Vec<O>,
}

impl<O> Kernel<O> {
    fn spawn(&mut self, body: Box<dyn Process<O>>) -> ProcessId {
        let process = ProcessId(self.slots.len());
        self.slots.push(Slot {
            state: ProcessState::Created,
            body: Some(body),
        });
        self.queue.schedule_now(Wakeup {
            process,
            wake: Wake::Start,
        });
        debug!(t = self.queue.now(), %process, "spawned");
        process
    }

    fn pool_mut(&mut self, pool: PoolId) -> Result<&mut ResourcePool, SimError> {
        self.pools
            .get_mut(pool.0)
            .ok_or(SimError::UnknownPool { pool })
    }

    fn release(&mut self, holder: ProcessId, pool: PoolId) -> Result<(), SimError> {
        let now = self.queue.now();
        let next = self.pool_mut(pool)?.release(pool, holder)?;
        debug!(t = now, process = %holder, %pool, "released");
        if let Some(process) = next {
            // Always through the queue, so same-instant ordering stays by sequence.
            self.queue.schedule_now(Wakeup {
                process,
                wake: Wake::Granted(pool),
            });
            debug!(t = now, %process, %pool, "granted from wait list");
        }
        Ok(())
    }
}

/// What a running process can see and do besides suspending.
pub struct Context<'a, O> {
    kernel: &'a mut Kernel<O>,
    current: ProcessId,
}

impl<O> Context<'_, O> {
    pub fn now(&self) -> SimTime {
        self.kernel.queue.now()
    }

    /// The process being resumed.
    pub fn current(&self) -> ProcessId {
        self.current
    }

    /// Start a new process at the current instant.
    pub fn spawn<P>(&mut self, process: P) -> ProcessId
    where
        P: Process<O> + 'static,
    {
        self.kernel.spawn(Box::new(process))
    }

    /// Give back the caller's slot in `pool`. Does not suspend.
    pub fn release(&mut self, pool: PoolId) -> Result<(), SimError> {
        self.kernel.release(self.current, pool)
    }

    /// Append a record to the simulation's output.
    pub fn emit(&mut self, record: O) {
        self.kernel.records.push(record);
    }

    pub fn pool(&self, pool: PoolId) -> Option<&ResourcePool> {
        self.kernel.pools.get(pool.0)
    }
}

/// Outcome of a call to [`Simulation::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub final_time: SimTime,
    pub events_processed: u64,
    /// Processes still waiting (on a timeout, a resource or their start) when
    /// the horizon was reached. They are dropped, not terminated.
    pub abandoned: usize,
    pub terminated: usize,
}

/// A single-threaded discrete-event simulation.
///
/// `O` is the type of record processes emit via [`Context::emit`].
pub struct Simulation<O> {
    kernel: Kernel<O>,
    events_processed: u64,
}

impl<O> Default for Simulation<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Simulation<O> {
    pub fn new() -> Simulation<O> {
        Simulation {
            kernel: Kernel {
                queue: EventQueue::new(),
                slots: Vec::new(),
                pools: Vec::new(),
                records: Vec::new(),
            },
            events_processed: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.kernel.queue.now()
    }

    pub fn add_pool(&mut self, capacity: usize, policy: QueuePolicy) -> Result<PoolId, SimError> {
        let pool = ResourcePool::new(capacity, policy)?;
        self.kernel.pools.push(pool);
        Ok(PoolId(self.kernel.pools.len() - 1))
    }

    pub fn pool(&self, pool: PoolId) -> Option<&ResourcePool> {
        self.kernel.pools.get(pool.0)
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.kernel.pools.iter().map(ResourcePool::stats).collect()
    }

    /// Register a process; it is first resumed at the current instant.
    pub fn spawn<P>(&mut self, process: P) -> ProcessId
    where
        P: Process<O> + 'static,
    {
        self.kernel.spawn(Box::new(process))
    }

    pub fn state(&self, process: ProcessId) -> Option<ProcessState> {
        self.kernel.slots.get(process.0).map(|slot| slot.state)
    }

    pub fn records(&self) -> &[O] {
        &self.kernel.records
    }

    pub fn take_records(&mut self) -> Vec<O> {
        std::mem::take(&mut self.kernel.records)
    }

    pub fn into_records(self) -> Vec<O> {
        self.kernel.records
    }

    /// Process events due at or before `until`, then set the clock to
    /// `until`. Events due later stay pending, so `run` can be called again
    /// with a later horizon.
    pub fn run(&mut self, until: SimTime) -> Result<RunSummary, SimError> {
        if !(until >= 0.0) {
            return Err(SimError::InvalidHorizon { horizon: until });
        }

        while let Some(due) = self.kernel.queue.peek_due() {
            if due > until {
                break;
            }
            let Some(event) = self.kernel.queue.pop_next() else {
                break;
            };
            trace!(
                t = event.due,
                seq = event.sequence,
                process = %event.payload.process,
                wake = ?event.payload.wake,
                "dispatch"
            );
            self.dispatch(event.payload)?;
            self.events_processed += 1;
        }

        if until.is_finite() {
            self.kernel.queue.advance_to(until);
        }

        let summary = self.summary();
        debug!(
            t = summary.final_time,
            events = summary.events_processed,
            abandoned = summary.abandoned,
            "horizon reached"
        );
        Ok(summary)
    }

    /// Queue a wakeup the process did not ask for.
    #[cfg(test)]
    fn inject(&mut self, process: ProcessId, wake: Wake) {
        self.kernel.queue.schedule_now(Wakeup { process, wake });
    }

    fn summary(&self) -> RunSummary {
        let abandoned = self
            .kernel
            .slots
            .iter()
            .filter(|slot| slot.state.is_pending())
            .count();
        let terminated = self
            .kernel
            .slots
            .iter()
            .filter(|slot| slot.state == ProcessState::Terminated)
            .count();
        RunSummary {
            final_time: self.now(),
            events_processed: self.events_processed,
            abandoned,
            terminated,
        }
    }

    fn dispatch(&mut self, wakeup: Wakeup) -> Result<(), SimError> {
        let Wakeup { process, mut wake } = wakeup;
        let idx = process.0;

        let mut body = {
            let slot = self
                .kernel
                .slots
                .get_mut(idx)
                .ok_or(SimError::DoubleResume { process })?;
            if !slot.state.accepts(wake) {
                return Err(SimError::DoubleResume { process });
            }
            slot.body.take().ok_or(SimError::DoubleResume { process })?
        };

        loop {
            self.kernel.slots[idx].state = ProcessState::Running;
            let step = {
                let mut ctx = Context {
                    kernel: &mut self.kernel,
                    current: process,
                };
                body.resume(wake, &mut ctx)?
            };

            match step {
                Step::Timeout(delay) => {
                    self.kernel.queue.schedule(
                        delay,
                        Wakeup {
                            process,
                            wake: Wake::Timeout,
                        },
                    )?;
                    self.kernel.slots[idx].state = ProcessState::Suspended(Suspension::Timeout);
                    break;
                }
                Step::Request { pool, priority } => {
                    let now = self.now();
                    match self.kernel.pool_mut(pool)?.request(pool, process, priority)? {
                        Admission::Granted => {
                            debug!(t = now, %process, %pool, "granted immediately");
                            wake = Wake::Granted(pool);
                        }
                        Admission::Queued => {
                            debug!(t = now, %process, %pool, priority, "queued");
                            self.kernel.slots[idx].state =
                                ProcessState::Suspended(Suspension::Resource(pool));
                            break;
                        }
                    }
                }
                Step::Done => {
                    if let Some(held) = self.kernel.pools.iter().position(|p| p.holds(process)) {
                        return Err(SimError::TerminatedHolding {
                            process,
                            pool: PoolId(held),
                        });
                    }
                    self.kernel.slots[idx].state = ProcessState::Terminated;
                    trace!(t = self.now(), %process, "terminated");
                    return Ok(());
                }
            }
        }

        self.kernel.slots[idx].body = Some(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Waits `delays` in turn, emitting the clock after each.
    struct Sleeper {
        delays: Vec<SimTime>,
    }

    impl Process<SimTime> for Sleeper {
        fn resume(&mut self, wake: Wake, ctx: &mut Context<'_, SimTime>) -> Result<Step, SimError> {
            if wake == Wake::Timeout {
                ctx.emit(ctx.now());
            }
            if self.delays.is_empty() {
                return Ok(Step::Done);
            }
            Ok(Step::Timeout(self.delays.remove(0)))
        }
    }

    #[test]
    fn noddy_run() {
        let mut sim = Simulation::new();
        sim.spawn(Sleeper {
            delays: vec![1.0, 2.0],
        });

        let summary = sim.run(f64::INFINITY).unwrap();

        assert_eq!(sim.records(), &[1.0, 3.0]);
        assert_eq!(summary.terminated, 1);
        assert_eq!(summary.abandoned, 0);
        assert_eq!(summary.final_time, 3.0);
    }

    #[test]
    fn horizon_is_inclusive_and_later_events_are_abandoned() {
        let mut sim = Simulation::new();
        let id = sim.spawn(Sleeper {
            delays: vec![5.0, 5.0],
        });

        let summary = sim.run(5.0).unwrap();

        assert_eq!(sim.records(), &[5.0]);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.final_time, 5.0);
        assert_eq!(
            sim.state(id),
            Some(ProcessState::Suspended(Suspension::Timeout))
        );
    }

    #[test]
    fn run_can_be_resumed_with_a_later_horizon() {
        let mut sim = Simulation::new();
        sim.spawn(Sleeper {
            delays: vec![5.0, 5.0],
        });
        sim.run(7.0).unwrap();
        assert_eq!(sim.now(), 7.0);

        sim.run(20.0).unwrap();
        assert_eq!(sim.records(), &[5.0, 10.0]);
    }

    #[test]
    fn negative_horizon_is_rejected() {
        let mut sim = Simulation::<SimTime>::new();
        assert_eq!(
            sim.run(-1.0),
            Err(SimError::InvalidHorizon { horizon: -1.0 })
        );
    }

    #[test]
    fn negative_timeout_aborts_the_run() {
        let mut sim = Simulation::new();
        sim.spawn(Sleeper { delays: vec![-2.0] });
        assert_eq!(
            sim.run(10.0),
            Err(SimError::NegativeDelay { delay: -2.0 })
        );
    }

    /// Requests one slot, holds it for `hold`, releases, emits its id.
    struct Holder {
        id: usize,
        pool: PoolId,
        hold: SimTime,
        release: bool,
    }

    impl Process<usize> for Holder {
        fn resume(&mut self, wake: Wake, ctx: &mut Context<'_, usize>) -> Result<Step, SimError> {
            match wake {
                Wake::Start => Ok(Step::request(self.pool)),
                Wake::Granted(_) => Ok(Step::Timeout(self.hold)),
                Wake::Timeout => {
                    if self.release {
                        ctx.release(self.pool)?;
                    }
                    ctx.emit(self.id);
                    Ok(Step::Done)
                }
            }
        }
    }

    #[test]
    fn waiting_processes_are_granted_in_request_order() {
        let mut sim = Simulation::new();
        let pool = sim.add_pool(1, QueuePolicy::Fifo).unwrap();
        for id in 0..3 {
            sim.spawn(Holder {
                id,
                pool,
                hold: 1.0,
                release: true,
            });
        }

        let summary = sim.run(f64::INFINITY).unwrap();

        assert_eq!(sim.records(), &[0, 1, 2]);
        assert_eq!(summary.final_time, 3.0);
        let stats = sim.pool(pool).unwrap().stats();
        assert_eq!(stats.total_granted, 3);
        assert_eq!(stats.total_released, 3);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn terminating_while_holding_is_a_protocol_violation() {
        let mut sim = Simulation::new();
        let pool = sim.add_pool(1, QueuePolicy::Fifo).unwrap();
        let id = sim.spawn(Holder {
            id: 0,
            pool,
            hold: 1.0,
            release: false,
        });

        assert_eq!(
            sim.run(10.0),
            Err(SimError::TerminatedHolding { process: id, pool })
        );
    }

    #[test]
    fn zero_capacity_pool_is_rejected_before_running() {
        let mut sim = Simulation::<usize>::new();
        assert_eq!(
            sim.add_pool(0, QueuePolicy::Priority),
            Err(SimError::InvalidCapacity { capacity: 0 })
        );
    }

    struct Spawner;

    impl Process<SimTime> for Spawner {
        fn resume(
            &mut self,
            _wake: Wake,
            ctx: &mut Context<'_, SimTime>,
        ) -> Result<Step, SimError> {
            ctx.spawn(Sleeper { delays: vec![0.5] });
            Ok(Step::Done)
        }
    }

    #[test]
    fn spawned_processes_start_at_the_current_instant() {
        let mut sim = Simulation::new();
        sim.spawn(Spawner);

        let summary = sim.run(1.0).unwrap();

        assert_eq!(sim.records(), &[0.5]);
        assert_eq!(summary.terminated, 2);
    }

    #[test]
    fn unexpected_wakeup_is_rejected_by_the_run_loop() {
        let mut sim = Simulation::new();
        let id = sim.spawn(Sleeper { delays: vec![5.0] });
        sim.run(1.0).unwrap();

        // Suspended on a timeout, so a second start must not resume it.
        sim.inject(id, Wake::Start);
        assert_eq!(sim.run(2.0), Err(SimError::DoubleResume { process: id }));
        assert_eq!(
            sim.state(id),
            Some(ProcessState::Suspended(Suspension::Timeout))
        );
    }

    #[test]
    fn wakeup_for_a_finished_or_unknown_process_is_rejected() {
        let mut sim = Simulation::new();
        let id = sim.spawn(Sleeper { delays: vec![] });
        sim.run(1.0).unwrap();
        assert_eq!(sim.state(id), Some(ProcessState::Terminated));

        sim.inject(id, Wake::Timeout);
        assert_eq!(sim.run(2.0), Err(SimError::DoubleResume { process: id }));

        let stranger = ProcessId(99);
        sim.inject(stranger, Wake::Start);
        assert_eq!(
            sim.run(3.0),
            Err(SimError::DoubleResume { process: stranger })
        );
    }

    struct Tracked(std::rc::Rc<()>);

    impl Process<SimTime> for Tracked {
        fn resume(
            &mut self,
            _wake: Wake,
            _ctx: &mut Context<'_, SimTime>,
        ) -> Result<Step, SimError> {
            Ok(Step::Done)
        }
    }

    #[test]
    fn finished_process_bodies_are_dropped() {
        let token = std::rc::Rc::new(());
        let mut sim = Simulation::new();
        for _ in 0..10 {
            sim.spawn(Tracked(token.clone()));
        }
        assert_eq!(std::rc::Rc::strong_count(&token), 11);

        let summary = sim.run(0.0).unwrap();

        assert_eq!(summary.terminated, 10);
        assert_eq!(std::rc::Rc::strong_count(&token), 1);
    }
}
