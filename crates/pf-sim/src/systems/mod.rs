//! Reference systems built on the engine contract.

pub mod environment;
pub mod respiration;

use crate::error::SimError;

pub use environment::{EnvironmentSettings, EnvironmentSystem};
pub use respiration::{RespirationSettings, RespirationSystem};

/// Gas graph shared by the environment and respiration systems.
pub const RESPIRATORY_GRAPH: &str = "Respiratory";

/// Ambient reservoir compartment inside [`RESPIRATORY_GRAPH`].
pub const ENVIRONMENT_COMPARTMENT: &str = "Environment";

fn missing(what: impl Into<String>) -> SimError {
    SimError::MissingSetup { what: what.into() }
}
