use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use bank_queue::bank::run_experiment;
use bank_queue::config::OrderingPolicy;
use bank_queue::stats::ClassSummary;
use bank_queue::{BankConfig, Error, ExperimentConfig, ScenarioOutput, output};
use clap::Parser;
use tracing::{error, info};

/// Appointment share used when `--policy priority` is chosen without one.
const DEFAULT_APPOINTMENT_PROBABILITY: f64 = 0.3;

#[derive(Parser, Debug)]
#[command(
    name = "bank_queue",
    about = "Multi-server bank queue simulation with optional appointment priority."
)]
struct Cli {
    /// Experiment TOML file; without one the baseline bank is simulated
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    policy: Option<OrderingPolicy>,

    /// Number of tellers (replaces any sweep in the config file)
    #[arg(long)]
    servers: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Closing time in minutes
    #[arg(long)]
    horizon: Option<f64>,

    #[arg(long)]
    appointment_probability: Option<f64>,

    #[arg(long)]
    replications: Option<usize>,

    /// Worker threads for replications (defaults to all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Directory for customers.csv / summary.json
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// -v for debug narration, -vv for every kernel event
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn experiment(&self) -> Result<ExperimentConfig, Error> {
        let mut experiment = match &self.config {
            Some(path) => {
                info!("loading experiment from {}", path.display());
                ExperimentConfig::from_path(path)?
            }
            None => ExperimentConfig::single("bank", BankConfig::baseline(), 1),
        };

        let bank = &mut experiment.bank;
        if let Some(policy) = self.policy {
            bank.policy = policy;
            if policy == OrderingPolicy::Priority
                && bank.appointment_probability == 0.0
                && self.appointment_probability.is_none()
            {
                bank.appointment_probability = DEFAULT_APPOINTMENT_PROBABILITY;
            }
        }
        if let Some(p) = self.appointment_probability {
            bank.appointment_probability = p;
        }
        if let Some(horizon) = self.horizon {
            bank.horizon = horizon;
        }
        if let Some(servers) = self.servers {
            bank.num_servers = servers;
            experiment.sweep = None;
        }
        if let Some(seed) = self.seed {
            experiment.bank.seed = seed;
            experiment.experiment.base_seed = Some(seed);
        }
        if let Some(replications) = self.replications {
            experiment.experiment.replications = replications;
        }
        Ok(experiment)
    }

    fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

fn print_class(name: &str, class: &ClassSummary) {
    match (class.wait, class.service) {
        (Some(wait), Some(service)) => println!(
            "  {:<12} served {:>4}   wait {:>7.2} ± {:<6.2} (max {:>6.2})   service {:>6.2}",
            name, class.served, wait.mean, wait.std_dev, wait.max, service.mean
        ),
        _ => println!("  {:<12} served {:>4}", name, class.served),
    }
}

fn print_report(scenario: &ScenarioOutput) {
    let output = &scenario.output;
    let config = &output.config;
    let summary = output.summary();

    println!(
        "\n{} ({} tellers, {}, seed {})",
        scenario.label, config.num_servers, config.policy, config.seed
    );
    println!(
        "  closed at t = {:.1}, {} still in the bank, peak queue {}",
        output.final_time,
        output.abandoned.saturating_sub(1),
        output.pool.peak_queue
    );
    print_class("All", &summary.overall);
    if config.policy == OrderingPolicy::Priority {
        print_class("Appointment", &summary.appointment);
        print_class("Walk-in", &summary.walk_in);
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let experiment = cli.experiment()?;
    let start = Instant::now();
    let scenarios = run_experiment(&experiment, cli.threads)?;
    info!(
        scenarios = scenarios.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "experiment finished"
    );

    println!("=== {} ===", experiment.experiment.name);
    for scenario in &scenarios {
        print_report(scenario);
    }

    if let Some(dir) = &cli.output {
        match scenarios.as_slice() {
            [single] => output::write_run(&single.output, dir)?,
            all => output::write_experiment(all, dir)?,
        }
        info!("results written to {}", dir.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
