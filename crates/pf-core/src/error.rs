use thiserror::Error;

pub type PfResult<T> = Result<T, PfError>;

/// How bad an error is for the running simulation.
///
/// - `Warning`: the input was clamped to a safe value and the step continues
/// - `Recoverable`: the operation was refused; the caller decides what happens next
/// - `Fatal`: an invariant broke and the run cannot continue
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Recoverable,
    Fatal,
}

impl Severity {
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Fatal)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PfError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: String },
}

impl PfError {
    pub fn severity(&self) -> Severity {
        match self {
            PfError::InvalidArg { .. } | PfError::IndexOob { .. } => Severity::Recoverable,
            PfError::NonFinite { .. } | PfError::Invariant { .. } => Severity::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Warning < Severity::Recoverable);
        assert!(Severity::Recoverable < Severity::Fatal);
        assert!(Severity::Fatal.is_fatal());
    }

    #[test]
    fn non_finite_is_fatal() {
        let err = PfError::NonFinite {
            what: "flow",
            value: f64::NAN,
        };
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.to_string().contains("flow"));
    }
}
