//! Error types for engine operations.

use pf_circuit::CircuitError;
use pf_compartment::CompartmentError;
use pf_core::{PfError, Severity};
use thiserror::Error;

/// Errors raised while assembling or stepping an engine.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Circuit(#[from] CircuitError),

    #[error(transparent)]
    Compartment(#[from] CompartmentError),

    #[error(transparent)]
    Core(#[from] PfError),

    #[error("Engine halted: {reason}")]
    Halted { reason: String },

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Run cancelled after {steps} steps")]
    Cancelled { steps: usize },

    #[error("No {what} named '{name}'")]
    UnknownTarget { what: &'static str, name: String },

    #[error("Cannot have multiple {kind} conditions")]
    ConflictingCondition { kind: &'static str },

    #[error("Invalid action: {what}")]
    InvalidAction { what: String },

    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Missing setup data: {what}")]
    MissingSetup { what: String },

    #[error("Snapshot does not match engine: {what}")]
    SnapshotMismatch { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn severity(&self) -> Severity {
        match self {
            SimError::Circuit(e) => e.severity(),
            SimError::Compartment(e) => e.severity(),
            SimError::Core(e) => e.severity(),
            SimError::Halted { .. } | SimError::MissingSetup { .. } => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
