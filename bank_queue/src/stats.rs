//! Summary statistics over departed customers.

use serde::{Deserialize, Serialize};

use crate::{Classification, CustomerRecord};

/// Mean, sample standard deviation and range of a set of durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Moments {
    /// `None` for an empty sample. A single value has zero spread.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Moments {
            mean,
            std_dev,
            min,
            max,
        })
    }
}

/// Wait and service statistics for one group of customers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassSummary {
    pub served: usize,
    pub wait: Option<Moments>,
    pub service: Option<Moments>,
}

impl ClassSummary {
    fn collect<'a>(records: impl Iterator<Item = &'a CustomerRecord>) -> Self {
        let (waits, services): (Vec<f64>, Vec<f64>) = records
            .map(|r| (r.wait_time(), r.service_duration()))
            .unzip();
        ClassSummary {
            served: waits.len(),
            wait: Moments::from_values(&waits),
            service: Moments::from_values(&services),
        }
    }

    pub fn mean_wait(&self) -> Option<f64> {
        self.wait.map(|m| m.mean)
    }

    pub fn mean_service(&self) -> Option<f64> {
        self.service.map(|m| m.mean)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub overall: ClassSummary,
    pub appointment: ClassSummary,
    pub walk_in: ClassSummary,
}

impl Summary {
    pub fn from_records(records: &[CustomerRecord]) -> Self {
        let of_class = |class: Classification| {
            ClassSummary::collect(records.iter().filter(move |r| r.classification == class))
        };
        Summary {
            overall: ClassSummary::collect(records.iter()),
            appointment: of_class(Classification::Appointment),
            walk_in: of_class(Classification::WalkIn),
        }
    }

    pub fn served(&self) -> usize {
        self.overall.served
    }
}
