//! Fluent assertion builder
//!
//! ```text
//! Assertion::new(&integration)
//!     .identify(json!({ "userId": 1 }))
//!     .set("key", "baz")
//!     .sends(json!({ "userId": 1, "key": "baz" }))
//!     .expects(200)
//!     .end().await?;
//! ```
//!
//! Deferred operations (`sends`, `expects`, `query`, ...) only record a
//! check; [`Assertion::end`] runs the integration and evaluates them.
//! Static operations (`name`, `timeout`, `channels`, `valid`, `maps`, ...)
//! compare immediately and return `Result<&Self, Error>`.

mod maps;
mod run;
mod statics;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use sendcheck_core::compare::inspect;
use sendcheck_core::{
    Action, Config, FacadeError, HeaderMatch, Message, MessageInput, Settings, to_message_as,
};
use serde_json::Value;

use crate::check::{Check, Expected, Sent};
use crate::http::{Capture, CapturedRequest};
use crate::integration::{Integration, Mapper};
use crate::query::{ParseFn, QueryBook, QueryMode};
use crate::registry::{Registry, Target};

pub use run::RunState;
pub use statics::TimeoutSpec;

/// Assertions about one integration run. Each instance owns its own
/// capture log and expectation registry.
pub struct Assertion<'a, I: Integration> {
    integration: &'a I,
    mapper: Mapper<I>,
    settings: Settings,
    fixtures_dir: Option<PathBuf>,
    message: Option<Result<Message, FacadeError>>,
    registry: Registry,
    queries: QueryBook,
    current: usize,
    max_target: Option<usize>,
    capture: Capture,
    state: RunState,
}

impl<'a, I: Integration> Assertion<'a, I> {
    /// Start asserting on `integration`, seeded with its default settings
    /// and mapper.
    pub fn new(integration: &'a I) -> Self {
        tracing::debug!(integration = integration.name(), "assertion created");
        Self {
            integration,
            mapper: integration.mapper(),
            settings: integration.settings(),
            fixtures_dir: None,
            message: None,
            registry: Registry::default(),
            queries: QueryBook::default(),
            current: 0,
            max_target: None,
            capture: Capture::new(),
            state: RunState::Built,
        }
    }

    /// Like [`Assertion::new`], loading fixtures from `<dir>/fixtures`.
    pub fn with_dirname(integration: &'a I, dir: impl AsRef<Path>) -> Self {
        let mut assertion = Self::new(integration);
        assertion.fixtures_dir = Some(dir.as_ref().join("fixtures"));
        assertion
    }

    /// Like [`Assertion::new`], applying the project configuration:
    /// its settings are merged over the integration's, and its fixtures
    /// directory is used.
    pub fn with_config(integration: &'a I, config: &Config) -> Self {
        let mut assertion = Self::new(integration);
        assertion.settings.merge(&config.settings);
        assertion.fixtures_dir = Some(config.fixtures_dir.clone());
        assertion
    }

    pub fn fixtures_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.fixtures_dir = Some(dir.into());
        self
    }

    /// Replace the mapper used by `maps`.
    pub fn mapper(&mut self, mapper: Mapper<I>) -> &mut Self {
        self.mapper = mapper;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The stored message, if a type selector ran and normalized cleanly.
    #[must_use]
    pub fn current_message(&self) -> Option<&Message> {
        self.message.as_ref().and_then(|message| message.as_ref().ok())
    }

    /// Requests captured so far, in creation order.
    #[must_use]
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.capture.requests()
    }

    /// Store the run's message. A later call replaces it.
    pub fn message(&mut self, action: Action, input: impl Into<MessageInput>) -> &mut Self {
        self.message = Some(to_message_as(action, input));
        self
    }

    /// [`Assertion::message`] with a settings overlay merged first.
    pub fn message_with(
        &mut self,
        action: Action,
        input: impl Into<MessageInput>,
        settings: Value,
    ) -> &mut Self {
        self.set_all(settings);
        self.message(action, input)
    }

    pub fn identify(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Identify, input)
    }

    pub fn track(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Track, input)
    }

    pub fn page(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Page, input)
    }

    pub fn screen(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Screen, input)
    }

    pub fn group(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Group, input)
    }

    pub fn alias(&mut self, input: impl Into<MessageInput>) -> &mut Self {
        self.message(Action::Alias, input)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.settings.set(key, value);
        self
    }

    /// Merge every key of an object into the settings. Other values are ignored.
    pub fn set_all(&mut self, values: Value) -> &mut Self {
        match values {
            Value::Object(map) => self.settings.merge(&map),
            other => tracing::warn!(value = %inspect(&other), "set_all expects an object"),
        }
        self
    }

    /// Attach subsequent expectations to request `index` (zero-based).
    pub fn request(&mut self, index: usize) -> &mut Self {
        self.current = index;
        self.max_target = self.max_target.max(Some(index));
        self
    }

    /// Exactly `count` requests must be made.
    pub fn requests(&mut self, count: usize) -> &mut Self {
        self.registry.push(Target::All, Check::RequestCount(count));
        self
    }

    /// Query parameter `key` must equal `value`. Unnamed parameters are not checked.
    pub fn query(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.add_query(QueryMode::Exact, key, value.into(), None)
    }

    /// Like [`Assertion::query`], converting the actual value with `parse` first.
    pub fn query_with(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        parse: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.add_query(QueryMode::Exact, key, value.into(), Some(Arc::new(parse)))
    }

    /// Every key of `expected` (an object) as a [`Assertion::query`].
    pub fn query_map(&mut self, expected: Value) -> &mut Self {
        self.add_query_map(QueryMode::Exact, expected)
    }

    /// Query parameter `key` must contain `value`.
    pub fn query_almost(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.add_query(QueryMode::Almost, key, value.into(), None)
    }

    pub fn query_almost_with(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        parse: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.add_query(QueryMode::Almost, key, value.into(), Some(Arc::new(parse)))
    }

    pub fn query_almost_map(&mut self, expected: Value) -> &mut Self {
        self.add_query_map(QueryMode::Almost, expected)
    }

    /// Expected request body: a JSON value, a [`Regex`] over the serialized
    /// body, a `?query` substring, or the exact body text.
    pub fn sends(&mut self, expected: impl Into<Sent>) -> &mut Self {
        self.push(Check::Sends(expected.into()))
    }

    pub fn sends_header(&mut self, name: &str, expected: impl Into<HeaderMatch>) -> &mut Self {
        self.push(Check::SendsHeader {
            name: name.to_string(),
            expected: expected.into(),
        })
    }

    /// Request body must equal `body` once `ignored` keys are removed from it.
    pub fn sends_almost<S: AsRef<str>>(&mut self, body: Value, ignored: &[S]) -> &mut Self {
        self.push(Check::SendsIgnoring {
            body,
            ignored: ignored.iter().map(|key| key.as_ref().to_string()).collect(),
        })
    }

    /// Expected response: a JSON body, a [`Regex`] or exact string over the
    /// response text, or a status code.
    pub fn expects(&mut self, expected: impl Into<Expected>) -> &mut Self {
        self.push(Check::Expects(expected.into()))
    }

    pub fn expects_header(&mut self, name: &str, expected: impl Into<HeaderMatch>) -> &mut Self {
        self.push(Check::ExpectsHeader {
            name: name.to_string(),
            expected: expected.into(),
        })
    }

    /// Request path, without query string, must equal `expected`.
    pub fn pathname(&mut self, expected: &str) -> &mut Self {
        self.push(Check::Pathname(expected.to_string()))
    }

    /// Shorthand for `sends(Regex)` with a pattern source.
    ///
    /// An invalid pattern is recorded as a failing check.
    pub fn sends_match(&mut self, pattern: &str) -> &mut Self {
        match Regex::new(pattern) {
            Ok(pattern) => self.sends(pattern),
            Err(e) => self.push(Check::Unsupported(format!("pattern /{pattern}/: {e}"))),
        }
    }

    fn push(&mut self, check: Check) -> &mut Self {
        self.registry.push(Target::Request(self.current), check);
        self.max_target = self.max_target.max(Some(self.current));
        self
    }

    fn add_query(
        &mut self,
        mode: QueryMode,
        key: &str,
        value: Value,
        parse: Option<ParseFn>,
    ) -> &mut Self {
        if self
            .queries
            .insert(mode, self.current, key.to_string(), value, parse)
        {
            self.push(Check::Query(mode));
        }
        self
    }

    fn add_query_map(&mut self, mode: QueryMode, expected: Value) -> &mut Self {
        match expected {
            Value::Object(map) => {
                for (key, value) in map {
                    self.add_query(mode, &key, value, None);
                }
                self
            }
            other => self.push(Check::Unsupported(format!("query {}", inspect(&other)))),
        }
    }
}

impl<I: Integration> fmt::Debug for Assertion<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("integration", &self.integration.name())
            .field("mapper", &self.mapper)
            .field("settings", &self.settings)
            .field("message", &self.message)
            .field("registry", &self.registry)
            .field("queries", &self.queries)
            .field("max_target", &self.max_target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
