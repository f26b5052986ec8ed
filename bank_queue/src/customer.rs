//! Arrival generator and customer lifecycle as `des` processes.

use std::cell::RefCell;
use std::rc::Rc;

use des::{Context, PoolId, Process, SimError, SimTime, Step, Wake};
use tracing::debug;

use crate::sources::{Classifier, DurationSource};
use crate::{Classification, CustomerRecord};

/// Service-time stream shared by every customer of a run.
pub type SharedSource = Rc<RefCell<dyn DurationSource>>;

/// Spawns a customer after every interarrival gap, forever.
pub struct ArrivalProcess {
    pool: PoolId,
    interarrival: Box<dyn DurationSource>,
    classifier: Box<dyn Classifier>,
    service: SharedSource,
    arrivals: usize,
}

impl ArrivalProcess {
    pub fn new(
        pool: PoolId,
        interarrival: Box<dyn DurationSource>,
        classifier: Box<dyn Classifier>,
        service: SharedSource,
    ) -> Self {
        ArrivalProcess {
            pool,
            interarrival,
            classifier,
            service,
            arrivals: 0,
        }
    }
}

impl Process<CustomerRecord> for ArrivalProcess {
    fn resume(
        &mut self,
        wake: Wake,
        ctx: &mut Context<'_, CustomerRecord>,
    ) -> Result<Step, SimError> {
        match wake {
            Wake::Start => {}
            Wake::Timeout => {
                self.arrivals += 1;
                let classification = self.classifier.classify();
                ctx.spawn(CustomerProcess::new(
                    self.arrivals,
                    classification,
                    self.pool,
                    Rc::clone(&self.service),
                ));
            }
            Wake::Granted(_) => {
                return Err(SimError::DoubleResume {
                    process: ctx.current(),
                });
            }
        }
        Ok(Step::Timeout(self.interarrival.draw()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Arriving,
    Waiting,
    InService,
    Departed,
}

/// One customer: arrive, queue for a teller, get served, leave.
pub struct CustomerProcess {
    id: usize,
    classification: Classification,
    pool: PoolId,
    service: SharedSource,
    stage: Stage,
    arrival_time: SimTime,
    service_start_time: SimTime,
}

impl CustomerProcess {
    pub fn new(
        id: usize,
        classification: Classification,
        pool: PoolId,
        service: SharedSource,
    ) -> Self {
        CustomerProcess {
            id,
            classification,
            pool,
            service,
            stage: Stage::Arriving,
            arrival_time: 0.0,
            service_start_time: 0.0,
        }
    }
}

impl Process<CustomerRecord> for CustomerProcess {
    fn resume(
        &mut self,
        wake: Wake,
        ctx: &mut Context<'_, CustomerRecord>,
    ) -> Result<Step, SimError> {
        let now = ctx.now();
        match (self.stage, wake) {
            (Stage::Arriving, Wake::Start) => {
                self.arrival_time = now;
                debug!(
                    customer = self.id,
                    t = now,
                    appointment = self.classification == Classification::Appointment,
                    "customer arrives"
                );
                self.stage = Stage::Waiting;
                Ok(Step::Request {
                    pool: self.pool,
                    priority: self.classification.priority_class(),
                })
            }
            (Stage::Waiting, Wake::Granted(pool)) if pool == self.pool => {
                self.service_start_time = now;
                debug!(
                    customer = self.id,
                    t = now,
                    waited = now - self.arrival_time,
                    "customer starts service"
                );
                let duration = self.service.borrow_mut().draw();
                self.stage = Stage::InService;
                Ok(Step::Timeout(duration))
            }
            (Stage::InService, Wake::Timeout) => {
                ctx.release(self.pool)?;
                debug!(customer = self.id, t = now, "customer leaves");
                ctx.emit(CustomerRecord {
                    id: self.id,
                    classification: self.classification,
                    priority_class: self.classification.priority_class(),
                    arrival_time: self.arrival_time,
                    service_start_time: self.service_start_time,
                    departure_time: now,
                });
                self.stage = Stage::Departed;
                Ok(Step::Done)
            }
            _ => Err(SimError::DoubleResume {
                process: ctx.current(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{AllWalkIn, Constant};
    use des::{QueuePolicy, Simulation};

    fn shared(source: impl DurationSource + 'static) -> SharedSource {
        Rc::new(RefCell::new(source))
    }

    #[test]
    fn single_customer_lifecycle() {
        let mut sim = Simulation::new();
        let pool = sim.add_pool(1, QueuePolicy::Fifo).unwrap();
        sim.spawn(CustomerProcess::new(
            1,
            Classification::WalkIn,
            pool,
            shared(Constant(3.0)),
        ));

        sim.run(10.0).unwrap();

        assert_eq!(
            sim.records(),
            &[CustomerRecord {
                id: 1,
                classification: Classification::WalkIn,
                priority_class: 1,
                arrival_time: 0.0,
                service_start_time: 0.0,
                departure_time: 3.0,
            }]
        );
        assert_eq!(sim.pool(pool).unwrap().in_use(), 0);
    }

    #[test]
    fn arrival_process_numbers_customers_from_one() {
        let mut sim = Simulation::new();
        let pool = sim.add_pool(5, QueuePolicy::Fifo).unwrap();
        sim.spawn(ArrivalProcess::new(
            pool,
            Box::new(Constant(1.0)),
            Box::new(AllWalkIn),
            shared(Constant(0.5)),
        ));

        sim.run(3.0).unwrap();

        let ids: Vec<usize> = sim.records().iter().map(|r| r.id).collect();
        let departures: Vec<f64> = sim.records().iter().map(|r| r.departure_time).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(departures, vec![1.5, 2.5]);
    }
}
