//! Rich failure: message + actual + expected, renderable as a diff

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of comparison produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Deep structural equality failed
    Equality,
    /// Expected subset is not contained in actual
    Containment,
    /// Value did not match a regular expression
    Pattern,
    /// Header missing or different
    Header,
    /// Query string missing or different
    QueryString,
    /// Request pathname different
    Pathname,
    /// Wrong number of captured requests
    RequestCount,
    /// A response was expected but the request never completed
    MissingResponse,
    /// Assertion was built from an argument combination it can't evaluate
    Shape,
    /// Static integration configuration mismatch
    Configuration,
}

impl FailureKind {
    /// Human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Equality => "values are not deeply equal",
            Self::Containment => "expected subset is not contained",
            Self::Pattern => "value does not match pattern",
            Self::Header => "header does not match",
            Self::QueryString => "query string does not match",
            Self::Pathname => "pathname does not match",
            Self::RequestCount => "unexpected number of requests",
            Self::MissingResponse => "request has no response",
            Self::Shape => "unsupported assertion shape",
            Self::Configuration => "integration configuration mismatch",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A comparison failure carrying both sides, so a reporter can render a
/// structured diff instead of only the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub actual: Value,
    pub expected: Value,
    /// Whether a reporter should render `actual` vs `expected` as a diff
    #[serde(default = "default_show_diff")]
    pub show_diff: bool,
}

const fn default_show_diff() -> bool {
    true
}

impl Failure {
    /// Create a failure with diff display enabled.
    #[must_use]
    pub fn new(
        kind: FailureKind,
        message: impl Into<String>,
        actual: impl Into<Value>,
        expected: impl Into<Value>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            actual: actual.into(),
            expected: expected.into(),
            show_diff: true,
        }
    }

    /// Prefix the message, keeping both sides intact.
    #[must_use]
    pub fn with_context(mut self, context: &str) -> Self {
        self.message = format!("{context} {}", self.message);
        self
    }

    /// Toggle diff display
    #[must_use]
    pub fn with_show_diff(mut self, show_diff: bool) -> Self {
        self.show_diff = show_diff;
        self
    }

    /// Render both sides as pretty JSON, one block per side.
    #[must_use]
    pub fn diff(&self) -> String {
        let actual = serde_json::to_string_pretty(&self.actual).unwrap_or_default();
        let expected = serde_json::to_string_pretty(&self.expected).unwrap_or_default();
        format!("- expected\n{expected}\n+ actual\n{actual}")
    }
}
