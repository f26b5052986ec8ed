//! Multi-server bank queue on top of the `des` kernel.
//!
//! Customers arrive with exponential gaps, queue for one of `num_servers`
//! tellers and leave after an exponential service time. Under
//! [`OrderingPolicy::Priority`] customers with an appointment are served
//! ahead of walk-ins; service is never interrupted.
//!
//! Key pieces:
//! - [`bank::Bank`]: wires the pool, the arrival generator and the sources
//!   together and runs to the horizon
//! - [`customer`]: the arrival generator and customer processes
//! - [`sources`]: injected, seedable duration and classification draws
//! - [`stats`] and [`output`]: consumers of the finished [`CustomerRecord`]s

use std::fmt;

use des::SimTime;
use serde::{Deserialize, Serialize};

pub mod bank;
pub mod config;
pub mod customer;
pub mod error;
pub mod output;
pub mod sources;
pub mod stats;

pub use bank::{Bank, BankSources, RunOutput, ScenarioOutput};
pub use config::{BankConfig, ExperimentConfig, OrderingPolicy};
pub use error::{ConfigError, Error};

/// Whether a customer booked ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Appointment,
    WalkIn,
}

impl Classification {
    /// Wait-list class; lower is served first under the priority policy.
    pub fn priority_class(self) -> i64 {
        match self {
            Classification::Appointment => 0,
            Classification::WalkIn => 1,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Appointment => write!(f, "Appointment"),
            Classification::WalkIn => write!(f, "Walk-in"),
        }
    }
}

/// One customer who has left the bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: usize, // 1-based, in arrival order
    pub classification: Classification,
    pub priority_class: i64,
    pub arrival_time: SimTime,
    pub service_start_time: SimTime,
    pub departure_time: SimTime,
}

impl CustomerRecord {
    pub fn wait_time(&self) -> SimTime {
        self.service_start_time - self.arrival_time
    }

    pub fn service_duration(&self) -> SimTime {
        self.departure_time - self.service_start_time
    }

    pub fn time_in_system(&self) -> SimTime {
        self.departure_time - self.arrival_time
    }

    pub fn is_appointment(&self) -> bool {
        self.classification == Classification::Appointment
    }
}
