//! Compartment graph errors.

use pf_circuit::CircuitError;
use pf_core::{PfError, Real, Severity};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompartmentError {
    #[error("Graph {graph}: duplicate {what} name '{name}'")]
    DuplicateName {
        graph: String,
        what: &'static str,
        name: String,
    },

    #[error("Graph {graph}: no {what} named '{name}'")]
    NotFound {
        graph: String,
        what: &'static str,
        name: String,
    },

    #[error("Graph {graph}: {what} belongs to another graph")]
    ForeignId { graph: String, what: &'static str },

    #[error("Graph {graph}: '{child}' already has parent '{parent}'")]
    AlreadyParented {
        graph: String,
        child: String,
        parent: String,
    },

    #[error("Graph {graph}: adding '{child}' under '{parent}' would create a cycle")]
    Cycle {
        graph: String,
        parent: String,
        child: String,
    },

    #[error("Graph {graph}: '{compartment}' maps nodes and cannot also have children")]
    MixedHierarchy { graph: String, compartment: String },

    #[error("Graph {graph}: node {node} is already mapped to '{compartment}'")]
    DuplicateNodeMapping {
        graph: String,
        compartment: String,
        node: String,
    },

    #[error("Graph {graph}: '{compartment}' is not a leaf")]
    NotLeaf { graph: String, compartment: String },

    #[error("Graph {graph}: substance '{substance}' is {actual}, graph holds {expected}")]
    PhaseMismatch {
        graph: String,
        substance: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Graph {graph}: substance '{substance}' is not active")]
    InactiveSubstance { graph: String, substance: String },

    #[error("Graph {graph}: invalid {what} {value} on '{compartment}'")]
    InvalidValue {
        graph: String,
        compartment: String,
        what: &'static str,
        value: Real,
    },

    #[error("Graph {graph}: volume fractions on '{compartment}' sum to {sum}, expected 1")]
    FractionSum {
        graph: String,
        compartment: String,
        sum: Real,
    },

    #[error("Graph {graph}: non-finite {what} on '{compartment}'")]
    NonFinite {
        graph: String,
        compartment: String,
        what: String,
    },

    #[error(transparent)]
    Circuit(#[from] CircuitError),
}

impl CompartmentError {
    pub fn severity(&self) -> Severity {
        match self {
            CompartmentError::FractionSum { .. } | CompartmentError::NonFinite { .. } => {
                Severity::Fatal
            }
            CompartmentError::Circuit(e) => e.severity(),
            _ => Severity::Recoverable,
        }
    }
}

impl From<CompartmentError> for PfError {
    fn from(err: CompartmentError) -> Self {
        match err {
            CompartmentError::Circuit(e) => e.into(),
            other if other.severity().is_fatal() => PfError::Invariant {
                what: other.to_string(),
            },
            _ => PfError::InvalidArg {
                what: "compartment graph configuration",
            },
        }
    }
}

pub type CompartmentResult<T> = Result<T, CompartmentError>;
