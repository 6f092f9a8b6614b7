//! Circuit-specific error types.

use pf_core::{NodeId, PathId, PfError, Real, Severity};
use thiserror::Error;

/// Circuit assembly, staging and solve errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError {
    #[error("Circuit {circuit}: duplicate {what} name '{name}'")]
    DuplicateName {
        circuit: String,
        what: &'static str,
        name: String,
    },

    #[error("Circuit {circuit}: path {path} refers to non-existent node {node}")]
    InvalidNodeRef {
        circuit: String,
        path: PathId,
        node: NodeId,
    },

    #[error("Circuit {circuit}: path '{path}' connects a node to itself")]
    SelfLoop { circuit: String, path: String },

    #[error("Circuit {circuit}: node '{node}' is not connected to any path")]
    IsolatedNode { circuit: String, node: String },

    #[error("Circuit {circuit} has no reference node")]
    NoReferenceNode { circuit: String },

    #[error("Circuit {circuit}: invalid {kind} value {value} on path '{path}'")]
    InvalidElementValue {
        circuit: String,
        path: String,
        kind: &'static str,
        value: Real,
    },

    #[error("Circuit {circuit}: path '{path}' is a {actual}, not a {expected}")]
    ElementMismatch {
        circuit: String,
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Circuit {circuit}: {what} '{name}' not found")]
    NotFound {
        circuit: String,
        what: &'static str,
        name: String,
    },

    #[error("Circuit {circuit}: invalid time step {dt}")]
    InvalidTimeStep { circuit: String, dt: Real },

    #[error("Circuit {circuit}: nodal matrix is singular")]
    Singular { circuit: String },

    #[error("Circuit {circuit}: non-finite {what} after solve")]
    NonFinite { circuit: String, what: String },

    #[error("Circuit {circuit}: valve states did not settle after {iterations} iterations")]
    ValveNonConvergence { circuit: String, iterations: usize },
}

pub type CircuitResult<T> = Result<T, CircuitError>;

impl CircuitError {
    /// Assembly and staging errors are refused operations; solve failures
    /// end the run.
    pub fn severity(&self) -> Severity {
        match self {
            CircuitError::Singular { .. }
            | CircuitError::NonFinite { .. }
            | CircuitError::ValveNonConvergence { .. } => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }
}

impl From<CircuitError> for PfError {
    fn from(err: CircuitError) -> Self {
        match err.severity() {
            Severity::Fatal => PfError::Invariant {
                what: err.to_string(),
            },
            _ => PfError::InvalidArg {
                what: "circuit configuration",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_failures_are_fatal() {
        let err = CircuitError::Singular {
            circuit: "c".into(),
        };
        assert_eq!(err.severity(), Severity::Fatal);
        let pf: PfError = err.into();
        assert!(matches!(pf, PfError::Invariant { .. }));
    }

    #[test]
    fn setup_errors_are_recoverable() {
        let err = CircuitError::NotFound {
            circuit: "c".into(),
            what: "path",
            name: "x".into(),
        };
        assert_eq!(err.severity(), Severity::Recoverable);
        assert!(err.to_string().contains("'x'"));
    }
}
