//! Deferred expectations
//!
//! Builder calls record [`Check`] values; nothing is compared until the
//! run has captured its requests. Each check evaluates against one
//! [`Exchange`] and yields `None` or the first [`Failure`].

use regex::Regex;
use sendcheck_core::compare::{self, inspect};
use sendcheck_core::{Failure, FailureKind, HeaderMatch};
use serde_json::{Value, json};

use crate::http::{CapturedRequest, Response};
use crate::query::{QueryBook, QueryMode};

/// Expected request body.
#[derive(Debug, Clone)]
pub enum Sent {
    /// Deep-equal to the structured body
    Json(Value),
    /// Serialized body matches
    Pattern(Regex),
    /// Query string contains this (a string starting with `?`)
    Query(String),
    /// Serialized body equals
    Text(String),
    /// A value no check can be built from
    Unsupported(String),
}

impl From<Value> for Sent {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Self::Json(value),
            Value::String(text) => Self::from(text),
            other => Self::Unsupported(inspect(&other)),
        }
    }
}

impl From<String> for Sent {
    fn from(text: String) -> Self {
        if text.starts_with('?') {
            Self::Query(text)
        } else {
            Self::Text(text)
        }
    }
}

impl From<&str> for Sent {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

impl From<Regex> for Sent {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// Expected response.
#[derive(Debug, Clone)]
pub enum Expected {
    /// Deep-equal to the parsed response body
    Json(Value),
    /// Response text matches
    Pattern(Regex),
    /// Response text equals
    Text(String),
    /// Response status equals
    Status(i64),
    Unsupported(String),
}

impl From<Value> for Expected {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => Self::Json(value),
            Value::String(text) => Self::Text(text),
            Value::Number(ref n) => n
                .as_i64()
                .map_or_else(|| Self::Unsupported(inspect(&value)), Self::Status),
            other => Self::Unsupported(inspect(&other)),
        }
    }
}

impl From<&str> for Expected {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Expected {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Regex> for Expected {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<i32> for Expected {
    fn from(status: i32) -> Self {
        Self::Status(i64::from(status))
    }
}

impl From<u16> for Expected {
    fn from(status: u16) -> Self {
        Self::Status(i64::from(status))
    }
}

/// One recorded expectation.
#[derive(Debug, Clone)]
pub(crate) enum Check {
    /// Total number of captured requests
    RequestCount(usize),
    Pathname(String),
    /// Evaluate the query table for this request
    Query(QueryMode),
    Sends(Sent),
    SendsIgnoring { body: Value, ignored: Vec<String> },
    SendsHeader { name: String, expected: HeaderMatch },
    Expects(Expected),
    ExpectsHeader { name: String, expected: HeaderMatch },
    /// Always fails; records an argument no check could be built from
    Unsupported(String),
}

/// What a check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exchange<'a> {
    pub index: usize,
    pub request: Option<&'a CapturedRequest>,
    /// Number of captured requests in the run
    pub total: usize,
}

impl Check {
    pub fn evaluate(&self, exchange: &Exchange<'_>, queries: &QueryBook) -> Option<Failure> {
        if let Self::RequestCount(expected) = self {
            return request_count(exchange.total, *expected);
        }
        if let Self::Unsupported(description) = self {
            return Some(unsupported(description));
        }
        let Some(request) = exchange.request else {
            return Some(Failure::new(
                FailureKind::MissingResponse,
                format!("expected request {} to have been made", exchange.index),
                Value::Null,
                exchange.index,
            ));
        };

        match self {
            Self::Pathname(expected) => pathname(request, expected),
            Self::Query(mode) => queries
                .get(*mode, request.index)
                .and_then(|set| set.evaluate(&request.path, *mode)),
            Self::Sends(sent) => sends(request, sent),
            Self::SendsIgnoring { body, ignored } => {
                let mut actual = request.body.as_value();
                compare::equals_ignoring(&mut actual, body, ignored)
            }
            Self::SendsHeader { name, expected } => compare::header(request, name, expected),
            Self::Expects(expected) => {
                response_of(request).map_or_else(Some, |response| expects(response, expected))
            }
            Self::ExpectsHeader { name, expected } => response_of(request)
                .map_or_else(Some, |response| compare::header(response, name, expected)),
            Self::RequestCount(_) | Self::Unsupported(_) => None,
        }
    }
}

fn request_count(actual: usize, expected: usize) -> Option<Failure> {
    (actual != expected).then(|| {
        Failure::new(
            FailureKind::RequestCount,
            format!("expected number of requests to be \"{expected}\", but it's \"{actual}\""),
            actual,
            expected,
        )
    })
}

fn unsupported(description: &str) -> Failure {
    Failure::new(
        FailureKind::Shape,
        format!("unknown assertion {description}"),
        Value::Null,
        description,
    )
    .with_show_diff(false)
}

fn pathname(request: &CapturedRequest, expected: &str) -> Option<Failure> {
    let actual = request.pathname();
    (actual != expected).then(|| {
        Failure::new(
            FailureKind::Pathname,
            format!("expected request pathname to be \"{expected}\" but got \"{actual}\""),
            actual,
            expected,
        )
    })
}

fn sends(request: &CapturedRequest, sent: &Sent) -> Option<Failure> {
    match sent {
        Sent::Json(body) => compare::equals(&request.body.as_value(), body),
        Sent::Pattern(pattern) => {
            compare::matches(&Value::String(request.body.serialized()), pattern)
        }
        Sent::Query(query) => compare::query(&request.path, query),
        Sent::Text(text) => compare::equals(
            &Value::String(request.body.serialized()),
            &Value::String(text.clone()),
        ),
        Sent::Unsupported(description) => Some(unsupported(description)),
    }
}

fn expects(response: &Response, expected: &Expected) -> Option<Failure> {
    match expected {
        Expected::Json(body) => compare::equals(&response.body, body),
        Expected::Pattern(pattern) => {
            compare::matches(&Value::String(response.text.clone()), pattern)
        }
        Expected::Text(text) => compare::equals(
            &Value::String(response.text.clone()),
            &Value::String(text.clone()),
        ),
        Expected::Status(status) => compare::equals(&json!(response.status), &json!(status)),
        Expected::Unsupported(description) => Some(unsupported(description)),
    }
}

/// The request's response, or a failure explaining why there is none.
fn response_of(request: &CapturedRequest) -> Result<&Response, Failure> {
    match &request.outcome {
        Some(Ok(response)) => Ok(response),
        Some(Err(err)) => {
            tracing::warn!(index = request.index, error = %err, "request has no response");
            Err(Failure::new(
                FailureKind::MissingResponse,
                format!("expected a response to request {} but it failed: {err}", request.index),
                err.to_string(),
                Value::Null,
            )
            .with_show_diff(false))
        }
        None => {
            tracing::warn!(index = request.index, "request never completed");
            Err(Failure::new(
                FailureKind::MissingResponse,
                format!(
                    "expected a response to request {} but it never completed",
                    request.index
                ),
                Value::Null,
                Value::Null,
            )
            .with_show_diff(false))
        }
    }
}
