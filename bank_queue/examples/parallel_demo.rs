//! Staffing sweep run on all cores.
//!
//! Simulates 1 to 6 tellers, 50 seeded replications each, under both
//! policies and prints the mean wait per staffing level.
//!
//! Run with:
//!   cargo run --release --example parallel_demo -p bank_queue

use std::time::Instant;

use bank_queue::{Bank, BankConfig, CustomerRecord};
use des::parallel::{ParallelRunner, Replication, ScenarioError};

const REPLICATIONS: usize = 50;
const STAFF_LEVELS: [usize; 6] = [1, 2, 3, 4, 5, 6];

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn mean_wait<E>(
    results: &[Result<Replication<CustomerRecord>, ScenarioError<E>>],
    filter: impl Fn(&CustomerRecord) -> bool,
) -> Option<f64> {
    mean(
        results
            .iter()
            .flatten()
            .flat_map(|replication| replication.records.iter())
            .filter(|record| filter(record))
            .map(|record| record.wait_time()),
    )
}

fn sweep(name: &str, base: BankConfig) {
    println!("\n--- {} ---", name);
    println!("tellers   mean wait   appointment   walk-in");

    for servers in STAFF_LEVELS {
        let config = base.clone().with_servers(servers);
        let horizon = config.horizon;
        let results = ParallelRunner::new(REPLICATIONS, |scenario_id| {
            let config = config.clone().with_seed(1000 + scenario_id as u64);
            Bank::new(config).map(Bank::into_simulation)
        })
        .run(horizon);

        let failed = results.iter().filter(|r| r.is_err()).count();
        let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.2}", v));
        println!(
            "{:>7}   {:>9}   {:>11}   {:>7}{}",
            servers,
            fmt(mean_wait(&results, |_| true)),
            fmt(mean_wait(&results, |r| r.is_appointment())),
            fmt(mean_wait(&results, |r| !r.is_appointment())),
            if failed > 0 {
                format!("   ({} failed)", failed)
            } else {
                String::new()
            }
        );
    }
}

fn main() {
    println!("=== Bank staffing sweep ===");
    println!(
        "{} replications per level, {} minutes of opening time",
        REPLICATIONS,
        BankConfig::baseline().horizon
    );

    let start = Instant::now();
    sweep("FIFO", BankConfig::baseline());
    sweep("Appointments first", BankConfig::appointments());
    println!("\nFinished in {:.2?}", start.elapsed());
}
