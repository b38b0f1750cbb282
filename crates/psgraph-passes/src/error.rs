//! Error types for pass registration and application.

use psgraph_core::CoreError;
use thiserror::Error;

/// Errors raised while building or running a pass pipeline.
///
/// None of these are recovered inside a pass; they surface to whoever runs
/// the pipeline. A failing pass may leave its programs partially rewritten.
#[derive(Debug, Error)]
pub enum PassError {
    /// The program declares a scheduler the PS decay table cannot run.
    #[error(
        "Not supported current LearningRate strategy {name}, \
         please use follow decay strategy: {supported:?}"
    )]
    UnsupportedScheduler {
        /// Name of the rejected scheduler.
        name: String,
        /// Names of the supported schedulers.
        supported: Vec<String>,
    },

    /// A context attribute required by a pass is absent.
    #[error("Missing pass context attribute: {key}")]
    MissingAttribute {
        /// The missing attribute key.
        key: String,
    },

    /// A pass name was registered twice.
    #[error("Duplicate pass registered for name {name}")]
    DuplicateName {
        /// The duplicated pass name.
        name: String,
    },

    /// A pass name has no registered constructor.
    #[error("Pass {name} not found in the pass registry")]
    UnknownPass {
        /// The requested pass name.
        name: String,
    },

    /// A pass rejected its own configuration.
    #[error("Pass {name} failed its self check")]
    CheckSelfFailed {
        /// The pass name.
        name: String,
    },

    /// Two selected passes cannot run in the same pipeline.
    #[error("Pass {pass} conflicts with pass {other}")]
    Conflict {
        /// The pass being checked.
        pass: String,
        /// The pass it conflicts with.
        other: String,
    },

    /// Pipeline configuration could not be read.
    #[error("Pipeline configuration error: {message}")]
    Config {
        /// A description of the configuration error.
        message: String,
    },

    /// Graph-model error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PassError {
    pub fn missing(key: impl Into<String>) -> Self {
        PassError::MissingAttribute { key: key.into() }
    }
}

/// A specialized Result type for pass operations.
pub type Result<T> = std::result::Result<T, PassError>;
