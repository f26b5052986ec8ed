//! Wires the bank model together and runs it.

use std::cell::RefCell;
use std::rc::Rc;

use des::parallel::{ParallelRunner, Replication, ScenarioError};
use des::{PoolId, PoolStats, RunSummary, SimTime, Simulation};
use tracing::info;

use crate::config::{ExperimentConfig, Scenario};
use crate::customer::{ArrivalProcess, SharedSource};
use crate::sources::{AllWalkIn, AppointmentDraw, Classifier, DurationSource, Exponential};
use crate::stats::Summary;
use crate::{BankConfig, CustomerRecord, Error, OrderingPolicy};

/// The three random streams a run consumes.
pub struct BankSources {
    pub interarrival: Box<dyn DurationSource>,
    pub service: SharedSource,
    pub classifier: Box<dyn Classifier>,
}

impl BankSources {
    pub fn new(
        interarrival: impl DurationSource + 'static,
        service: impl DurationSource + 'static,
        classifier: impl Classifier + 'static,
    ) -> Self {
        BankSources {
            interarrival: Box::new(interarrival),
            service: Rc::new(RefCell::new(service)),
            classifier: Box::new(classifier),
        }
    }

    /// Exponential draws seeded from `config.seed`: interarrival on `seed`,
    /// service on `seed + 1`, appointments on `seed + 2`.
    pub fn seeded(config: &BankConfig) -> Result<Self, Error> {
        // Reports the offending field by name before the sources see it.
        config.validate()?;
        let seed = config.seed;
        let interarrival = Exponential::with_mean(config.mean_interarrival_time, seed)?;
        let service = Exponential::with_mean(config.mean_service_time, seed.wrapping_add(1))?;
        let classifier: Box<dyn Classifier> = match config.policy {
            OrderingPolicy::Fifo => Box::new(AllWalkIn),
            OrderingPolicy::Priority => Box::new(AppointmentDraw::new(
                config.appointment_probability,
                seed.wrapping_add(2),
            )?),
        };
        Ok(BankSources {
            interarrival: Box::new(interarrival),
            service: Rc::new(RefCell::new(service)),
            classifier,
        })
    }
}

/// Everything a finished run hands to the statistics and output layers.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub config: BankConfig,
    /// Departed customers, in departure order.
    pub records: Vec<CustomerRecord>,
    pub final_time: SimTime,
    pub pool: PoolStats,
    /// Processes still waiting at the horizon, the arrival generator included.
    pub abandoned: usize,
    pub events_processed: u64,
}

impl RunOutput {
    fn new(
        config: BankConfig,
        summary: RunSummary,
        records: Vec<CustomerRecord>,
        pool: PoolStats,
    ) -> Self {
        RunOutput {
            config,
            records,
            final_time: summary.final_time,
            pool,
            abandoned: summary.abandoned,
            events_processed: summary.events_processed,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary::from_records(&self.records)
    }
}

/// A single bank run, ready to go.
pub struct Bank {
    config: BankConfig,
    sim: Simulation<CustomerRecord>,
    pool: PoolId,
}

impl Bank {
    /// Validate `config` and build a bank with seeded exponential draws.
    pub fn new(config: BankConfig) -> Result<Self, Error> {
        let sources = BankSources::seeded(&config)?;
        Self::with_sources(config, sources)
    }

    /// Build a bank drawing from `sources` instead of the seeded defaults.
    pub fn with_sources(config: BankConfig, sources: BankSources) -> Result<Self, Error> {
        config.validate()?;
        let mut sim = Simulation::new();
        let pool = sim.add_pool(config.num_servers, config.policy.into())?;
        sim.spawn(ArrivalProcess::new(
            pool,
            sources.interarrival,
            sources.classifier,
            sources.service,
        ));
        Ok(Bank { config, sim, pool })
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn into_simulation(self) -> Simulation<CustomerRecord> {
        self.sim
    }

    /// Run until the configured horizon.
    pub fn run(mut self) -> Result<RunOutput, Error> {
        info!(
            servers = self.config.num_servers,
            policy = %self.config.policy,
            horizon = self.config.horizon,
            seed = self.config.seed,
            "starting bank simulation"
        );
        let summary = self.sim.run(self.config.horizon)?;
        let pool = self
            .sim
            .pool(self.pool)
            .map(|pool| pool.stats())
            .unwrap_or_default();
        let records = self.sim.into_records();
        info!(
            served = records.len(),
            abandoned = summary.abandoned,
            "bank simulation finished"
        );
        Ok(RunOutput::new(self.config, summary, records, pool))
    }
}

/// Run one bank with seeded draws.
pub fn run(config: &BankConfig) -> Result<RunOutput, Error> {
    Bank::new(config.clone())?.run()
}

/// One finished run of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutput {
    pub label: String,
    pub replication: usize,
    pub output: RunOutput,
}

/// Run every scenario of `experiment` on a rayon pool.
///
/// Fails with the first scenario error, in scenario order.
pub fn run_experiment(
    experiment: &ExperimentConfig,
    threads: Option<usize>,
) -> Result<Vec<ScenarioOutput>, Error> {
    experiment.validate()?;
    let scenarios = experiment.scenarios();
    let horizon = experiment.bank.horizon;
    info!(
        experiment = %experiment.experiment.name,
        scenarios = scenarios.len(),
        "running experiment"
    );

    let mut runner = ParallelRunner::new(scenarios.len(), |scenario_id| {
        Bank::new(scenarios[scenario_id].config.clone()).map(Bank::into_simulation)
    });
    if let Some(n) = threads {
        runner = runner.num_threads(n);
    }
    let results = runner.run(horizon);

    scenarios
        .into_iter()
        .zip(results)
        .enumerate()
        .map(|(scenario_id, (scenario, result))| collect_scenario(scenario_id, scenario, result))
        .collect()
}

fn collect_scenario(
    scenario_id: usize,
    scenario: Scenario,
    result: Result<Replication<CustomerRecord>, ScenarioError<Error>>,
) -> Result<ScenarioOutput, Error> {
    let replication = result.map_err(|err| match err {
        ScenarioError::Panicked(message) => Error::Panicked {
            scenario: scenario_id,
            message,
        },
        ScenarioError::Build(err) => err,
        ScenarioError::Simulation(err) => Error::Simulation(err),
    })?;
    // A bank simulation owns exactly one pool.
    let pool = replication.pools.first().copied().unwrap_or_default();
    let Scenario {
        label,
        replication: rep,
        config,
    } = scenario;
    Ok(ScenarioOutput {
        label,
        replication: rep,
        output: RunOutput::new(config, replication.summary, replication.records, pool),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn seeded_sources_name_the_bad_mean() {
        let config = BankConfig {
            mean_service_time: 0.0,
            ..BankConfig::baseline()
        };
        assert!(matches!(
            BankSources::seeded(&config),
            Err(Error::Config(ConfigError::NonPositiveMean {
                field: "mean_service_time",
                ..
            }))
        ));

        let config = BankConfig {
            mean_interarrival_time: -1.0,
            ..BankConfig::baseline()
        };
        assert!(matches!(
            BankSources::seeded(&config),
            Err(Error::Config(ConfigError::NonPositiveMean {
                field: "mean_interarrival_time",
                ..
            }))
        ));
    }

    #[test]
    fn infinite_horizon_is_rejected_before_running() {
        let config = BankConfig {
            horizon: f64::INFINITY,
            ..BankConfig::baseline()
        };
        assert!(matches!(
            run(&config),
            Err(Error::Config(ConfigError::NonFiniteHorizon { .. }))
        ));
    }
}
