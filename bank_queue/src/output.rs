//! CSV and JSON export of finished runs.
//!
//! A single run writes `customers.csv` and `summary.json` into a directory.
//! An experiment writes one such directory per scenario plus a
//! `sweep_summary.csv` with one row per scenario.

use std::fs;
use std::path::Path;

use des::PoolStats;
use serde::{Deserialize, Serialize};

use crate::stats::Summary;
use crate::{BankConfig, CustomerRecord, Error, RunOutput, ScenarioOutput};

/// Serializable copy of the kernel's pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolReport {
    pub capacity: usize,
    pub in_use: usize,
    pub queued: usize,
    pub total_granted: usize,
    pub total_released: usize,
    pub peak_queue: usize,
    pub utilization: f64,
}

impl From<&PoolStats> for PoolReport {
    fn from(stats: &PoolStats) -> Self {
        PoolReport {
            capacity: stats.capacity,
            in_use: stats.in_use,
            queued: stats.queued,
            total_granted: stats.total_granted,
            total_released: stats.total_released,
            peak_queue: stats.peak_queue,
            utilization: stats.utilization(),
        }
    }
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub config: BankConfig,
    pub final_time: f64,
    pub abandoned: usize,
    pub events_processed: u64,
    pub pool: PoolReport,
    pub summary: Summary,
}

impl From<&RunOutput> for RunReport {
    fn from(output: &RunOutput) -> Self {
        RunReport {
            config: output.config.clone(),
            final_time: output.final_time,
            abandoned: output.abandoned,
            events_processed: output.events_processed,
            pool: PoolReport::from(&output.pool),
            summary: output.summary(),
        }
    }
}

/// One row of `sweep_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub label: String,
    pub num_servers: usize,
    pub replication: usize,
    pub seed: u64,
    pub served: usize,
    pub abandoned: usize,
    pub mean_wait: Option<f64>,
    pub mean_service: Option<f64>,
    pub appointment_mean_wait: Option<f64>,
    pub walk_in_mean_wait: Option<f64>,
}

impl From<&ScenarioOutput> for SweepRow {
    fn from(scenario: &ScenarioOutput) -> Self {
        let summary = scenario.output.summary();
        SweepRow {
            label: scenario.label.clone(),
            num_servers: scenario.output.config.num_servers,
            replication: scenario.replication,
            seed: scenario.output.config.seed,
            served: summary.served(),
            abandoned: scenario.output.abandoned,
            mean_wait: summary.overall.mean_wait(),
            mean_service: summary.overall.mean_service(),
            appointment_mean_wait: summary.appointment.mean_wait(),
            walk_in_mean_wait: summary.walk_in.mean_wait(),
        }
    }
}

/// Write one row per departed customer, in departure order.
pub fn write_records_csv<P: AsRef<Path>>(records: &[CustomerRecord], path: P) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "id",
        "classification",
        "priority_class",
        "arrival_time",
        "service_start_time",
        "departure_time",
        "wait_time",
        "service_duration",
    ])?;

    for record in records {
        wtr.write_record(&[
            record.id.to_string(),
            record.classification.to_string(),
            record.priority_class.to_string(),
            record.arrival_time.to_string(),
            record.service_start_time.to_string(),
            record.departure_time.to_string(),
            record.wait_time().to_string(),
            record.service_duration().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_summary_json<P: AsRef<Path>>(output: &RunOutput, path: P) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(&RunReport::from(output))?;
    fs::write(path, json)?;
    Ok(())
}

/// Write `customers.csv` and `summary.json` into `dir`, creating it.
pub fn write_run<P: AsRef<Path>>(output: &RunOutput, dir: P) -> Result<(), Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    write_records_csv(&output.records, dir.join("customers.csv"))?;
    write_summary_json(output, dir.join("summary.json"))?;
    Ok(())
}

pub fn write_sweep_csv<P: AsRef<Path>>(scenarios: &[ScenarioOutput], path: P) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for scenario in scenarios {
        wtr.serialize(SweepRow::from(scenario))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write every scenario into `dir/<label>/` plus `dir/sweep_summary.csv`.
pub fn write_experiment<P: AsRef<Path>>(scenarios: &[ScenarioOutput], dir: P) -> Result<(), Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    for scenario in scenarios {
        write_run(&scenario.output, dir.join(&scenario.label))?;
    }
    write_sweep_csv(scenarios, dir.join("sweep_summary.csv"))?;
    Ok(())
}
