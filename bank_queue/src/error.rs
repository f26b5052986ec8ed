use des::SimError;
use thiserror::Error;

/// Invalid parameters, reported before any event is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("num_servers must be at least 1")]
    NoServers,

    #[error("{field} must be a positive number, got {value}")]
    NonPositiveMean { field: &'static str, value: f64 },

    #[error("horizon must be non-negative, got {horizon}")]
    NegativeHorizon { horizon: f64 },

    #[error("horizon must be finite, got {horizon}")]
    NonFiniteHorizon { horizon: f64 },

    #[error("appointment_probability must be within [0, 1], got {probability}")]
    ProbabilityOutOfRange { probability: f64 },

    #[error("sweep lists no server counts")]
    EmptySweep,

    #[error("replications must be at least 1")]
    NoReplications,

    #[error("a replayed source needs at least one value")]
    EmptyReplay,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("simulation failed: {0}")]
    Simulation(#[from] SimError),

    #[error("scenario {scenario} panicked: {message}")]
    Panicked { scenario: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("CSV output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}
