//! Errors surfaced by an assertion run or a static assertion

use sendcheck_core::{Action, FacadeError, Failure, FixtureError};

use crate::integration::{IntegrationError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A terminal or targeted operation ran before any type selector
    #[error("you must call .identify() / .alias() etc.. before running")]
    NoMessage,
    #[error(transparent)]
    Facade(#[from] FacadeError),
    /// The integration has no handler for the message's action
    #[error("{0}() is not implemented")]
    NotImplemented(Action),
    /// The integration itself reported an error; passed through unchanged
    #[error(transparent)]
    Integration(IntegrationError),
    /// An expectation failed
    #[error(transparent)]
    Assertion(#[from] Failure),
    #[error("assertions made for {asserted} requests but only {made} were made")]
    InsufficientRequests { asserted: usize, made: usize },
    #[error("expected integration to error")]
    ExpectedIntegrationError,
    #[error("expected integration to have validation for \"{0}\"")]
    UnregisteredValidation(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("expected .validate(msg, settings) to return an error.")]
    ExpectedInvalid,
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("no fixtures directory configured, cannot load fixture \"{0}\"")]
    NoFixtureDir(String),
    #[error("integration.mapper.{0}() is missing")]
    MapperMissing(String),
    #[error("integration.mapper.{name}() returned \"{returned}\"")]
    MapperReturnedFalsy { name: String, returned: String },
    #[error("invalid timeout {0:?}: {1}")]
    InvalidTimeout(String, String),
}

impl Error {
    /// The rich failure, when this error came from a comparison.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Assertion(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<IntegrationError> for Error {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotImplemented(action) => Self::NotImplemented(action),
            other => Self::Integration(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sendcheck_core::FailureKind;

    #[test]
    fn insufficient_requests_message() {
        let err = Error::InsufficientRequests {
            asserted: 3,
            made: 1,
        };
        assert_eq!(
            err.to_string(),
            "assertions made for 3 requests but only 1 were made"
        );
        assert!(err.failure().is_none());
    }

    #[test]
    fn not_implemented_is_split_out() {
        let err = Error::from(IntegrationError::NotImplemented(Action::Page));
        assert!(matches!(err, Error::NotImplemented(Action::Page)));
        assert_eq!(err.to_string(), "page() is not implemented");

        let err = Error::from(IntegrationError::Other("boom".into()));
        assert!(matches!(err, Error::Integration(_)));
    }

    #[test]
    fn assertion_exposes_failure() {
        let err = Error::from(Failure::new(FailureKind::Equality, "expected 1 but got 2", 2, 1));
        assert_eq!(err.to_string(), "expected 1 but got 2");
        assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::Equality));
    }
}
