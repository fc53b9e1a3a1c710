//! The integration contract
//!
//! An integration turns analytics messages into HTTP calls. It exposes its
//! configuration (name, endpoint, channels, validations), an optional
//! [`Mapper`] that converts messages into payloads, and one async handler
//! per message action.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use sendcheck_core::compare::is_truthy;
use sendcheck_core::{Action, Channel, Message, Settings};
use serde_json::{Map, Value};

use crate::http::{Http, Response};

/// What a handler returns on success: one response or several.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Responses(Vec<Response>);

impl Responses {
    #[must_use]
    pub fn into_vec(self) -> Vec<Response> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Response> {
        self.0.first()
    }
}

impl From<Response> for Responses {
    fn from(response: Response) -> Self {
        Self(vec![response])
    }
}

impl From<Vec<Response>> for Responses {
    fn from(responses: Vec<Response>) -> Self {
        Self(responses)
    }
}

/// Result of running a handler.
pub type Outcome = Result<Responses, IntegrationError>;

/// Error raised by an integration handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    /// No handler for this action
    #[error("{0}() is not implemented")]
    NotImplemented(Action),
    /// The destination answered with a non-2xx status
    #[error("{status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

impl IntegrationError {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message text without the status prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Transport(message) | Self::Other(message) => {
                message.clone()
            }
            Self::NotImplemented(_) => self.to_string(),
        }
    }
}

/// Where a validation reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Message,
    Settings,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "settings" => Ok(Self::Settings),
            other => Err(ValidationError::UnknownScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{scope} attribute \"{path}\" is required")]
    Missing { scope: Scope, path: String },
    #[error("{scope} attribute \"{path}\" is invalid: {reason}")]
    Invalid {
        scope: Scope,
        path: String,
        reason: String,
    },
    #[error("unknown validation scope \"{0}\"")]
    UnknownScope(String),
}

/// Custom check for a validated value. Receives the value at the path
/// (`Null` when absent).
pub type Validator = fn(&Value, &Message, &Settings) -> Result<(), String>;

/// A declared validation rule: "this path must be present", optionally
/// restricted to some actions and refined by a custom [`Validator`].
#[derive(Debug, Clone)]
pub struct Validation {
    pub scope: Scope,
    pub path: String,
    /// Free-form metadata, e.g. `{"methods": ["track"]}`
    pub meta: Map<String, Value>,
    pub validator: Option<Validator>,
}

impl Validation {
    /// Require `path` on the message.
    #[must_use]
    pub fn message(path: impl Into<String>) -> Self {
        Self::new(Scope::Message, path)
    }

    /// Require `path` in the settings.
    #[must_use]
    pub fn settings(path: impl Into<String>) -> Self {
        Self::new(Scope::Settings, path)
    }

    fn new(scope: Scope, path: impl Into<String>) -> Self {
        Self {
            scope,
            path: path.into(),
            meta: Map::new(),
            validator: None,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Only apply to the given actions.
    #[must_use]
    pub fn methods(self, actions: &[Action]) -> Self {
        let names: Vec<Value> = actions
            .iter()
            .map(|action| Value::String(action.as_str().to_string()))
            .collect();
        self.with_meta("methods", names)
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// `scope.path`, e.g. `settings.apiKey`.
    #[must_use]
    pub fn qualified_path(&self) -> String {
        format!("{}.{}", self.scope, self.path)
    }

    #[must_use]
    pub fn applies_to(&self, action: Action) -> bool {
        match self.meta.get("methods").and_then(Value::as_array) {
            Some(methods) => methods
                .iter()
                .filter_map(Value::as_str)
                .any(|name| name.eq_ignore_ascii_case(action.as_str())),
            None => true,
        }
    }

    /// # Errors
    ///
    /// Returns error if the value is missing/empty or the custom validator rejects it
    pub fn check(&self, message: &Message, settings: &Settings) -> Result<(), ValidationError> {
        let value = match self.scope {
            Scope::Message => message.get(&self.path),
            Scope::Settings => settings.get_path(&self.path),
        };
        let value = value.cloned().unwrap_or(Value::Null);
        match self.validator {
            Some(validator) => {
                validator(&value, message, settings).map_err(|reason| ValidationError::Invalid {
                    scope: self.scope,
                    path: self.path.clone(),
                    reason,
                })
            }
            None if is_truthy(&value) => Ok(()),
            None => Err(ValidationError::Missing {
                scope: self.scope,
                path: self.path.clone(),
            }),
        }
    }
}

/// Mapping function: message and settings to the payload the integration sends.
pub type MapFn<I> = fn(&I, &Message, &Settings) -> Option<Value>;

struct EventMapping<I> {
    name: String,
    pattern: Regex,
    map: MapFn<I>,
}

/// Per-action mapping functions, plus track mappings selected by event name.
pub struct Mapper<I> {
    actions: Vec<(Action, MapFn<I>)>,
    events: Vec<EventMapping<I>>,
}

impl<I> Mapper<I> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Map messages of `action`. Registering an action twice replaces it.
    #[must_use]
    pub fn on(mut self, action: Action, map: MapFn<I>) -> Self {
        self.actions.retain(|(existing, _)| *existing != action);
        self.actions.push((action, map));
        self
    }

    /// Map track messages whose event matches `pattern`. Event mappings are
    /// tried in registration order before the plain track mapping.
    #[must_use]
    pub fn on_event(mut self, name: impl Into<String>, pattern: Regex, map: MapFn<I>) -> Self {
        self.events.push(EventMapping {
            name: name.into(),
            pattern,
            map,
        });
        self
    }

    /// Pick the mapping for `message`, with the name used in error messages.
    #[must_use]
    pub fn resolve(&self, message: &Message) -> Option<(&str, MapFn<I>)> {
        if message.action() == Action::Track {
            let event = message.event().unwrap_or_default();
            if let Some(mapping) = self.events.iter().find(|m| m.pattern.is_match(event)) {
                return Some((mapping.name.as_str(), mapping.map));
            }
        }
        self.actions
            .iter()
            .find(|(action, _)| *action == message.action())
            .map(|(action, map)| (action.as_str(), *map))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.events.is_empty()
    }
}

impl<I> Default for Mapper<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Clone for Mapper<I> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            events: self
                .events
                .iter()
                .map(|m| EventMapping {
                    name: m.name.clone(),
                    pattern: m.pattern.clone(),
                    map: m.map,
                })
                .collect(),
        }
    }
}

impl<I> fmt::Debug for Mapper<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field(
                "actions",
                &self.actions.iter().map(|(a, _)| *a).collect::<Vec<_>>(),
            )
            .field(
                "events",
                &self.events.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// An analytics destination under test.
///
/// Only [`Integration::name`] is required. Handlers default to
/// [`IntegrationError::NotImplemented`].
#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;

    /// Base URL relative request paths resolve against
    fn endpoint(&self) -> &str {
        ""
    }

    fn retries(&self) -> u32 {
        0
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn channels(&self) -> Vec<Channel> {
        vec![Channel::Server]
    }

    /// Default settings, before any assertion overrides
    fn settings(&self) -> Settings {
        Settings::new()
    }

    fn validations(&self) -> Vec<Validation> {
        Vec::new()
    }

    fn mapper(&self) -> Mapper<Self>
    where
        Self: Sized,
    {
        Mapper::new()
    }

    /// Whether the integration accepts `message`. Messages without a
    /// channel count as server-side.
    fn enabled(&self, message: &Message, _settings: &Settings) -> bool {
        let channel = message.channel().unwrap_or(Channel::Server);
        self.channels().contains(&channel)
    }

    /// Run every validation that applies to the message's action.
    ///
    /// # Errors
    ///
    /// Returns the first failing validation
    fn validate(&self, message: &Message, settings: &Settings) -> Result<(), ValidationError> {
        self.validations()
            .iter()
            .filter(|validation| validation.applies_to(message.action()))
            .try_for_each(|validation| validation.check(message, settings))
    }

    async fn identify(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Identify))
    }

    async fn track(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Track))
    }

    async fn page(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Page))
    }

    async fn screen(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Screen))
    }

    async fn group(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Group))
    }

    async fn alias(&self, _message: &Message, _settings: &Settings, _http: &Http) -> Outcome {
        Err(IntegrationError::NotImplemented(Action::Alias))
    }
}

/// Invoke the handler matching the message's action.
///
/// # Errors
///
/// Returns whatever the handler returns
pub async fn dispatch<I: Integration + ?Sized>(
    integration: &I,
    message: &Message,
    settings: &Settings,
    http: &Http,
) -> Outcome {
    match message.action() {
        Action::Identify => integration.identify(message, settings, http).await,
        Action::Track => integration.track(message, settings, http).await,
        Action::Page => integration.page(message, settings, http).await,
        Action::Screen => integration.screen(message, settings, http).await,
        Action::Group => integration.group(message, settings, http).await,
        Action::Alias => integration.alias(message, settings, http).await,
    }
}
