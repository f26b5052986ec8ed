//! Injected random draws.
//!
//! The simulation only ever calls [`DurationSource::draw`] and
//! [`Classifier::classify`]; reproducibility is a property of the source.

use des::SimTime;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution, Exp};

use crate::{Classification, ConfigError};

/// Produces non-negative durations (interarrival gaps, service times).
pub trait DurationSource {
    fn draw(&mut self) -> SimTime;
}

impl<F> DurationSource for F
where
    F: FnMut() -> SimTime,
{
    fn draw(&mut self) -> SimTime {
        self()
    }
}

/// Exponentially distributed durations from a seeded generator.
pub struct Exponential {
    distribution: Exp<f64>,
    rng: StdRng,
}

impl Exponential {
    pub fn with_mean(mean: SimTime, seed: u64) -> Result<Self, ConfigError> {
        if !(mean > 0.0) || !mean.is_finite() {
            return Err(ConfigError::NonPositiveMean {
                field: "mean",
                value: mean,
            });
        }
        let distribution = Exp::new(1.0 / mean).map_err(|_| ConfigError::NonPositiveMean {
            field: "mean",
            value: mean,
        })?;
        Ok(Exponential {
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl DurationSource for Exponential {
    fn draw(&mut self) -> SimTime {
        self.distribution.sample(&mut self.rng)
    }
}

/// Always the same duration.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub SimTime);

impl DurationSource for Constant {
    fn draw(&mut self) -> SimTime {
        self.0
    }
}

/// Replays a fixed list of durations, starting over when exhausted.
#[derive(Debug, Clone)]
pub struct Replay {
    values: Vec<SimTime>,
    next: usize,
}

impl Replay {
    pub fn new(values: Vec<SimTime>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::EmptyReplay);
        }
        Ok(Replay { values, next: 0 })
    }
}

impl DurationSource for Replay {
    fn draw(&mut self) -> SimTime {
        let value = self.values[self.next];
        self.next = (self.next + 1) % self.values.len();
        value
    }
}

/// Decides whether a new customer holds an appointment.
pub trait Classifier {
    fn classify(&mut self) -> Classification;
}

/// Every customer is a walk-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllWalkIn;

impl Classifier for AllWalkIn {
    fn classify(&mut self) -> Classification {
        Classification::WalkIn
    }
}

/// Appointment with fixed probability, from a seeded generator.
pub struct AppointmentDraw {
    distribution: Bernoulli,
    rng: StdRng,
}

impl AppointmentDraw {
    pub fn new(probability: f64, seed: u64) -> Result<Self, ConfigError> {
        let distribution = Bernoulli::new(probability)
            .map_err(|_| ConfigError::ProbabilityOutOfRange { probability })?;
        Ok(AppointmentDraw {
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Classifier for AppointmentDraw {
    fn classify(&mut self) -> Classification {
        if self.distribution.sample(&mut self.rng) {
            Classification::Appointment
        } else {
            Classification::WalkIn
        }
    }
}

/// Cycles through a fixed pattern of classifications.
#[derive(Debug, Clone)]
pub struct ClassPattern {
    pattern: Vec<Classification>,
    next: usize,
}

impl ClassPattern {
    pub fn new(pattern: Vec<Classification>) -> Result<Self, ConfigError> {
        if pattern.is_empty() {
            return Err(ConfigError::EmptyReplay);
        }
        Ok(ClassPattern { pattern, next: 0 })
    }
}

impl Classifier for ClassPattern {
    fn classify(&mut self) -> Classification {
        let class = self.pattern[self.next];
        self.next = (self.next + 1) % self.pattern.len();
        class
    }
}
