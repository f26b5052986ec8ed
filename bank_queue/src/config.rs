//! Model parameters and TOML experiment files.

use std::fmt;
use std::fs;
use std::path::Path;

use des::{QueuePolicy, SimTime};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Error};

/// How the tellers pick the next waiting customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Single line, first come first served.
    #[default]
    Fifo,
    /// Appointments ahead of walk-ins, first come first served within each.
    Priority,
}

impl From<OrderingPolicy> for QueuePolicy {
    fn from(policy: OrderingPolicy) -> Self {
        match policy {
            OrderingPolicy::Fifo => QueuePolicy::Fifo,
            OrderingPolicy::Priority => QueuePolicy::Priority,
        }
    }
}

impl fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingPolicy::Fifo => write!(f, "fifo"),
            OrderingPolicy::Priority => write!(f, "priority"),
        }
    }
}

/// Parameters of a single bank run. Times are in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub num_servers: usize,
    pub mean_interarrival_time: SimTime,
    pub mean_service_time: SimTime,
    pub horizon: SimTime,
    pub policy: OrderingPolicy,
    /// Chance that an arriving customer has an appointment. Ignored under
    /// FIFO, where everyone is a walk-in.
    pub appointment_probability: f64,
    pub seed: u64,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

impl BankConfig {
    /// Four staff, a customer every 2 minutes on average, 4 minute mean
    /// service, one hour of opening time.
    pub fn baseline() -> Self {
        BankConfig {
            num_servers: 4,
            mean_interarrival_time: 2.0,
            mean_service_time: 4.0,
            horizon: 60.0,
            policy: OrderingPolicy::Fifo,
            appointment_probability: 0.0,
            seed: 42,
        }
    }

    /// Baseline with 30% of customers holding a booked appointment.
    pub fn appointments() -> Self {
        BankConfig {
            policy: OrderingPolicy::Priority,
            appointment_probability: 0.3,
            ..Self::baseline()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_servers(mut self, num_servers: usize) -> Self {
        self.num_servers = num_servers;
        self
    }

    pub fn arrival_rate(&self) -> f64 {
        1.0 / self.mean_interarrival_time
    }

    pub fn service_rate(&self) -> f64 {
        1.0 / self.mean_service_time
    }

    /// Appointment probability actually used by the arrival generator.
    pub fn effective_appointment_probability(&self) -> f64 {
        match self.policy {
            OrderingPolicy::Fifo => 0.0,
            OrderingPolicy::Priority => self.appointment_probability,
        }
    }

    /// Offered load per server, `λ / (c·μ)`.
    pub fn traffic_intensity(&self) -> f64 {
        self.arrival_rate() / (self.num_servers as f64 * self.service_rate())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_servers < 1 {
            return Err(ConfigError::NoServers);
        }
        for (field, value) in [
            ("mean_interarrival_time", self.mean_interarrival_time),
            ("mean_service_time", self.mean_service_time),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositiveMean { field, value });
            }
        }
        if !(self.horizon >= 0.0) {
            return Err(ConfigError::NegativeHorizon {
                horizon: self.horizon,
            });
        }
        // The arrival generator never stops on its own.
        if !self.horizon.is_finite() {
            return Err(ConfigError::NonFiniteHorizon {
                horizon: self.horizon,
            });
        }
        if !(0.0..=1.0).contains(&self.appointment_probability) {
            return Err(ConfigError::ProbabilityOutOfRange {
                probability: self.appointment_probability,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_replications")]
    pub replications: usize,
    /// First seed; replication `r` uses `base_seed + r`, wrapping at
    /// `u64::MAX`. Defaults to the
    /// bank's own seed.
    #[serde(default)]
    pub base_seed: Option<u64>,
}

fn default_replications() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub num_servers: Vec<usize>,
}

/// A batch of runs loaded from TOML.
///
/// ```toml
/// [experiment]
/// name = "staffing"
/// replications = 10
/// base_seed = 42
///
/// [bank]
/// policy = "priority"
/// appointment_probability = 0.3
///
/// [sweep]
/// num_servers = [2, 3, 4, 5]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub experiment: ExperimentMetadata,
    #[serde(default)]
    pub bank: BankConfig,
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

/// One concrete run of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub label: String,
    pub replication: usize,
    pub config: BankConfig,
}

impl ExperimentConfig {
    /// An experiment of `replications` runs of `bank`, no sweep.
    pub fn single(name: &str, bank: BankConfig, replications: usize) -> Self {
        ExperimentConfig {
            experiment: ExperimentMetadata {
                name: name.to_string(),
                description: String::new(),
                replications,
                base_seed: None,
            },
            bank,
            sweep: None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment.replications == 0 {
            return Err(ConfigError::NoReplications);
        }
        if let Some(sweep) = &self.sweep {
            if sweep.num_servers.is_empty() {
                return Err(ConfigError::EmptySweep);
            }
        }
        for scenario in self.scenarios() {
            scenario.config.validate()?;
        }
        Ok(())
    }

    fn server_counts(&self) -> Vec<usize> {
        match &self.sweep {
            Some(sweep) => sweep.num_servers.clone(),
            None => vec![self.bank.num_servers],
        }
    }

    /// Every run, grouped by server count, replications in seed order.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let base_seed = self.experiment.base_seed.unwrap_or(self.bank.seed);
        let mut scenarios = Vec::new();
        for num_servers in self.server_counts() {
            for replication in 0..self.experiment.replications {
                let config = self
                    .bank
                    .clone()
                    .with_servers(num_servers)
                    .with_seed(base_seed.wrapping_add(replication as u64));
                scenarios.push(Scenario {
                    label: format!("staff{}_rep{}", num_servers, replication),
                    replication,
                    config,
                });
            }
        }
        scenarios
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_matches_the_bank_constants() {
        let config = BankConfig::baseline();
        assert_eq!(config.num_servers, 4);
        assert_eq!(config.mean_service_time, 4.0);
        assert_eq!(config.mean_interarrival_time, 2.0);
        assert_eq!(config.horizon, 60.0);
        assert_eq!(config.seed, 42);
        assert_eq!(config.arrival_rate(), 0.5);
        assert_eq!(config.service_rate(), 0.25);
        assert_eq!(config.traffic_intensity(), 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn fifo_ignores_appointment_probability() {
        let mut config = BankConfig::appointments();
        assert_eq!(config.effective_appointment_probability(), 0.3);
        config.policy = OrderingPolicy::Fifo;
        assert_eq!(config.effective_appointment_probability(), 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let base = BankConfig::baseline();

        assert_eq!(
            base.clone().with_servers(0).validate(),
            Err(ConfigError::NoServers)
        );
        assert_eq!(
            BankConfig {
                mean_service_time: 0.0,
                ..base.clone()
            }
            .validate(),
            Err(ConfigError::NonPositiveMean {
                field: "mean_service_time",
                value: 0.0
            })
        );
        assert!(
            BankConfig {
                mean_interarrival_time: -2.0,
                ..base.clone()
            }
            .validate()
            .is_err()
        );
        assert_eq!(
            BankConfig {
                horizon: -1.0,
                ..base.clone()
            }
            .validate(),
            Err(ConfigError::NegativeHorizon { horizon: -1.0 })
        );
        assert_eq!(
            BankConfig {
                horizon: f64::INFINITY,
                ..base.clone()
            }
            .validate(),
            Err(ConfigError::NonFiniteHorizon {
                horizon: f64::INFINITY
            })
        );
        assert_eq!(
            BankConfig {
                appointment_probability: 1.5,
                ..base
            }
            .validate(),
            Err(ConfigError::ProbabilityOutOfRange { probability: 1.5 })
        );
    }

    #[test]
    fn parses_experiment_toml_with_defaults() {
        let toml = r#"
            [experiment]
            name = "staffing"
            replications = 2
            base_seed = 100

            [bank]
            policy = "priority"
            appointment_probability = 0.25

            [sweep]
            num_servers = [2, 3]
        "#;
        let experiment = ExperimentConfig::from_toml_str(toml).unwrap();

        assert_eq!(experiment.bank.policy, OrderingPolicy::Priority);
        assert_eq!(experiment.bank.mean_service_time, 4.0);
        assert!(experiment.validate().is_ok());

        let scenarios = experiment.scenarios();
        let summary: Vec<(usize, u64)> = scenarios
            .iter()
            .map(|s| (s.config.num_servers, s.config.seed))
            .collect();
        assert_eq!(summary, vec![(2, 100), (2, 101), (3, 100), (3, 101)]);
        assert_eq!(scenarios[3].label, "staff3_rep1");
    }

    #[test]
    fn bundled_staffing_experiment_is_valid() {
        let experiment =
            ExperimentConfig::from_toml_str(include_str!("../experiments/staffing.toml")).unwrap();
        assert!(experiment.validate().is_ok());
        assert_eq!(experiment.scenarios().len(), 100);
        assert_eq!(experiment.bank.num_servers, 4);
    }

    #[test]
    fn replication_seeds_wrap_at_the_top_of_the_range() {
        let mut experiment = ExperimentConfig::single("x", BankConfig::baseline(), 3);
        experiment.experiment.base_seed = Some(u64::MAX);

        assert!(experiment.validate().is_ok());
        let seeds: Vec<u64> = experiment
            .scenarios()
            .iter()
            .map(|s| s.config.seed)
            .collect();
        assert_eq!(seeds, vec![u64::MAX, 0, 1]);
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let toml = r#"
            [experiment]
            name = "bad"

            [bank]
            policy = "lifo"
        "#;
        assert!(matches!(
            ExperimentConfig::from_toml_str(toml),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn empty_sweep_and_zero_replications_are_rejected() {
        let mut experiment = ExperimentConfig::single("x", BankConfig::baseline(), 0);
        assert_eq!(experiment.validate(), Err(ConfigError::NoReplications));

        experiment.experiment.replications = 1;
        experiment.sweep = Some(SweepConfig {
            num_servers: vec![],
        });
        assert_eq!(experiment.validate(), Err(ConfigError::EmptySweep));

        experiment.sweep = Some(SweepConfig {
            num_servers: vec![1, 0],
        });
        assert_eq!(experiment.validate(), Err(ConfigError::NoServers));
    }
}
