//! Run coordinator: invoke the integration, then evaluate expectations
//!
//! ```text
//! Built --end()--> Running --handler Ok--> Resolved --> Evaluated
//!                          \--handler Err--> Failed
//! ```

use sendcheck_core::{Failure, FailureKind};
use serde_json::Value;

use super::Assertion;
use crate::check::{Exchange, Expected};
use crate::error::Error;
use crate::http::{CapturedRequest, Http, Response};
use crate::integration::{Integration, IntegrationError, dispatch};
use crate::query::QueryBook;
use crate::registry::{Registry, Target};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Message and expectations assembled, not yet run
    Built,
    /// Integration handler in progress
    Running,
    /// Handler returned responses
    Resolved,
    /// Handler returned an error; expectations were not evaluated
    Failed,
    /// Expectations checked
    Evaluated,
}

impl<I: Integration> Assertion<'_, I> {
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Run the integration and evaluate every recorded expectation.
    ///
    /// # Errors
    ///
    /// - [`Error::NoMessage`] / [`Error::Facade`] before the integration runs
    /// - [`Error::NotImplemented`] / [`Error::Integration`] if the handler fails
    /// - [`Error::InsufficientRequests`] if a targeted request was never made
    /// - [`Error::Assertion`] with the first failing expectation
    pub async fn end(&mut self) -> Result<Vec<Response>, Error> {
        let message = match &self.message {
            None => return Err(Error::NoMessage),
            Some(Err(err)) => return Err(Error::Facade(err.clone())),
            Some(Ok(message)) => message.clone(),
        };

        self.state = RunState::Running;
        tracing::debug!(
            integration = self.integration.name(),
            action = %message.action(),
            "running integration"
        );
        let http = Http::intercepted(
            self.integration.endpoint(),
            self.integration.timeout(),
            self.capture.clone(),
        );
        let responses = match dispatch(self.integration, &message, &self.settings, &http).await {
            Ok(responses) => responses.into_vec(),
            Err(err) => {
                self.state = RunState::Failed;
                tracing::debug!(error = %err, "integration failed");
                return Err(Error::from(err));
            }
        };
        self.state = RunState::Resolved;

        let captured = self.capture.requests();
        let verdict = evaluate(&self.registry, &self.queries, &captured, self.max_target);
        self.state = RunState::Evaluated;
        verdict.map(|()| responses)
    }

    /// Record `expects(expected)` and run.
    ///
    /// # Errors
    ///
    /// See [`Assertion::end`]
    pub async fn expects_end(
        &mut self,
        expected: impl Into<Expected>,
    ) -> Result<Vec<Response>, Error> {
        self.expects(expected);
        self.end().await
    }

    /// Run and require the integration to report an error, optionally with
    /// the given status and message text. Returns that error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExpectedIntegrationError`] if the run succeeded, an
    /// assertion error if status or message differ, or any other run error
    pub async fn error(
        &mut self,
        status: Option<u16>,
        message: Option<&str>,
    ) -> Result<IntegrationError, Error> {
        let err = match self.end().await {
            Err(Error::Integration(err)) => err,
            Err(other) => return Err(other),
            Ok(_) => return Err(Error::ExpectedIntegrationError),
        };

        if let Some(expected) = status {
            let actual = err.status();
            if actual != Some(expected) {
                return Err(Error::Assertion(Failure::new(
                    FailureKind::Equality,
                    format!(
                        "expected error status {expected} but got {}",
                        actual.map_or_else(|| "none".to_string(), |s| s.to_string())
                    ),
                    actual.map_or(Value::Null, Value::from),
                    expected,
                )));
            }
        }
        if let Some(expected) = message {
            let actual = err.message();
            if actual != expected {
                return Err(Error::Assertion(Failure::new(
                    FailureKind::Equality,
                    format!("expected error message {expected:?} but got {actual:?}"),
                    actual,
                    expected,
                )));
            }
        }
        Ok(err)
    }
}

/// Check `captured` against the registry.
///
/// Every targeted index must exist, then run-wide checks run, then each
/// request's checks in index order. The first failure ends evaluation.
pub(crate) fn evaluate(
    registry: &Registry,
    queries: &QueryBook,
    captured: &[CapturedRequest],
    max_target: Option<usize>,
) -> Result<(), Error> {
    let made = captured.len();
    tracing::debug!(made, checks = registry.len(), "evaluating expectations");

    if let Some(max) = max_target {
        let asserted = max + 1;
        if asserted > made {
            tracing::debug!(asserted, made, "too few requests");
            return Err(Error::InsufficientRequests { asserted, made });
        }
    }

    let run = Exchange {
        index: 0,
        request: None,
        total: made,
    };
    if let Some(failure) = registry.resolve(Target::All, &run, queries) {
        tracing::debug!(message = %failure, "run expectation failed");
        return Err(Error::Assertion(failure));
    }

    for request in captured {
        let exchange = Exchange {
            index: request.index,
            request: Some(request),
            total: made,
        };
        if let Some(failure) = registry.resolve(Target::Request(request.index), &exchange, queries)
        {
            tracing::debug!(index = request.index, message = %failure, "request expectation failed");
            return Err(Error::Assertion(failure));
        }
    }
    Ok(())
}
