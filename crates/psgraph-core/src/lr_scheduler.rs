//! Learning-rate scheduler declarations attached to a training program.
//!
//! Only the scheduler *configuration* lives here; the decay arithmetic runs
//! inside the parameter-server runtime. Schedulers are a closed set so that
//! the graph passes can match on them exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scheduler names the parameter-server decay table can materialise.
pub const PS_SUPPORTED_SCHEDULERS: [&str; 4] = [
    "NoamDecay",
    "NaturalExpDecay",
    "InverseTimeDecay",
    "ExponentialDecay",
];

fn default_learning_rate() -> f64 {
    1.0
}

/// A learning-rate scheduler declared on a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LrScheduler {
    /// `lr * gamma ^ (step / decay_steps)`.
    ExponentialDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        gamma: f64,
    },
    /// `lr * d_model^-0.5 * min(step^-0.5, step * warmup^-1.5)`.
    NoamDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        d_model: i64,
        warmup_steps: i64,
    },
    /// `lr * exp(-gamma * step / decay_steps)`.
    NaturalExpDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        gamma: f64,
    },
    /// `lr / (1 + gamma * step / decay_steps)`.
    InverseTimeDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        gamma: f64,
    },
    PiecewiseDecay {
        boundaries: Vec<i64>,
        values: Vec<f64>,
    },
    PolynomialDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        decay_steps: i64,
        #[serde(default)]
        end_lr: f64,
        #[serde(default = "default_learning_rate")]
        power: f64,
        #[serde(default)]
        cycle: bool,
    },
    StepDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        step_size: i64,
        gamma: f64,
    },
    CosineAnnealingDecay {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        t_max: i64,
        #[serde(default)]
        eta_min: f64,
    },
}

impl LrScheduler {
    pub fn exponential(gamma: f64) -> Self {
        LrScheduler::ExponentialDecay {
            learning_rate: 1.0,
            gamma,
        }
    }

    pub fn noam(d_model: i64, warmup_steps: i64) -> Self {
        LrScheduler::NoamDecay {
            learning_rate: 1.0,
            d_model,
            warmup_steps,
        }
    }

    pub fn natural_exp(gamma: f64) -> Self {
        LrScheduler::NaturalExpDecay {
            learning_rate: 1.0,
            gamma,
        }
    }

    pub fn inverse_time(gamma: f64) -> Self {
        LrScheduler::InverseTimeDecay {
            learning_rate: 1.0,
            gamma,
        }
    }

    /// The scheduler's class name, e.g. `"ExponentialDecay"`.
    pub fn name(&self) -> &'static str {
        match self {
            LrScheduler::ExponentialDecay { .. } => "ExponentialDecay",
            LrScheduler::NoamDecay { .. } => "NoamDecay",
            LrScheduler::NaturalExpDecay { .. } => "NaturalExpDecay",
            LrScheduler::InverseTimeDecay { .. } => "InverseTimeDecay",
            LrScheduler::PiecewiseDecay { .. } => "PiecewiseDecay",
            LrScheduler::PolynomialDecay { .. } => "PolynomialDecay",
            LrScheduler::StepDecay { .. } => "StepDecay",
            LrScheduler::CosineAnnealingDecay { .. } => "CosineAnnealingDecay",
        }
    }

    /// Whether the parameter-server decay table can run this scheduler.
    pub fn is_ps_supported(&self) -> bool {
        PS_SUPPORTED_SCHEDULERS.contains(&self.name())
    }

    /// The user-configured base learning rate.
    pub fn base_learning_rate(&self) -> f64 {
        match self {
            LrScheduler::ExponentialDecay { learning_rate, .. }
            | LrScheduler::NoamDecay { learning_rate, .. }
            | LrScheduler::NaturalExpDecay { learning_rate, .. }
            | LrScheduler::InverseTimeDecay { learning_rate, .. }
            | LrScheduler::PolynomialDecay { learning_rate, .. }
            | LrScheduler::StepDecay { learning_rate, .. }
            | LrScheduler::CosineAnnealingDecay { learning_rate, .. } => *learning_rate,
            LrScheduler::PiecewiseDecay { values, .. } => values.first().copied().unwrap_or(0.0),
        }
    }
}

impl fmt::Display for LrScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LrScheduler::ExponentialDecay { gamma, .. }
            | LrScheduler::NaturalExpDecay { gamma, .. }
            | LrScheduler::InverseTimeDecay { gamma, .. } => {
                write!(f, "{}(gamma={})", self.name(), gamma)
            }
            LrScheduler::NoamDecay {
                d_model,
                warmup_steps,
                ..
            } => write!(
                f,
                "NoamDecay(d_model={}, warmup_steps={})",
                d_model, warmup_steps
            ),
            LrScheduler::StepDecay {
                step_size, gamma, ..
            } => write!(f, "StepDecay(step_size={}, gamma={})", step_size, gamma),
            _ => f.write_str(self.name()),
        }
    }
}
