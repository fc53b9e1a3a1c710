//! Canonical analytics messages and the facade that builds them from raw records
//!
//! A [`MessageInput`] is either a raw JSON record or an already typed
//! [`Message`]. [`to_message`] pattern-matches on that tag: typed messages
//! pass through unchanged, raw records have their action inferred.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical action kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Identify,
    Track,
    Page,
    Screen,
    Group,
    Alias,
}

impl Action {
    pub const ALL: [Self; 6] = [
        Self::Identify,
        Self::Screen,
        Self::Group,
        Self::Alias,
        Self::Track,
        Self::Page,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::Track => "track",
            Self::Page => "page",
            Self::Screen => "screen",
            Self::Group => "group",
            Self::Alias => "alias",
        }
    }

    /// Title-cased name, e.g. `Identify`.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::Track => "Track",
            Self::Page => "Page",
            Self::Screen => "Screen",
            Self::Group => "Group",
            Self::Alias => "Alias",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = FacadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FacadeError::UnknownType(s.to_string()))
    }
}

/// Origin context of a message, used for enablement checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Server,
    Client,
    Mobile,
}

impl Channel {
    pub const ALL: [Self; 3] = [Self::Server, Self::Client, Self::Mobile];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = FacadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FacadeError::UnknownChannel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacadeError {
    #[error("no such message type \"{0}\"")]
    UnknownType(String),
    #[error("no such channel \"{0}\"")]
    UnknownChannel(String),
    #[error("expected message to be an object, got {0}")]
    NotAnObject(&'static str),
}

/// A typed message. Immutable once built; [`Message::with_channel`]
/// returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    action: Action,
    fields: Map<String, Value>,
}

impl Message {
    #[must_use]
    pub fn new(action: Action, fields: Map<String, Value>) -> Self {
        Self { action, fields }
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Raw fields as given, without the injected `type`.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Dotted-path accessor, e.g. `properties.revenue`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }

    fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.get_str("userId")
    }

    #[must_use]
    pub fn anonymous_id(&self) -> Option<&str> {
        self.get_str("anonymousId")
    }

    /// Event name; only meaningful for track messages.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        self.get_str("event")
    }

    /// Channel the message claims to come from. Unknown names read as `None`.
    #[must_use]
    pub fn channel(&self) -> Option<Channel> {
        self.get_str("channel").and_then(|c| c.parse().ok())
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.fields
            .insert("channel".into(), Value::String(channel.as_str().into()));
        self
    }

    /// Plain-object view: all fields plus `"type"`.
    #[must_use]
    pub fn json(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("type".into(), Value::String(self.action.as_str().into()));
        Value::Object(fields)
    }
}

/// Either a raw record or an already built message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageInput {
    Raw(Value),
    Typed(Message),
}

impl From<Value> for MessageInput {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

impl From<Map<String, Value>> for MessageInput {
    fn from(fields: Map<String, Value>) -> Self {
        Self::Raw(Value::Object(fields))
    }
}

impl From<Message> for MessageInput {
    fn from(message: Message) -> Self {
        Self::Typed(message)
    }
}

impl From<&Message> for MessageInput {
    fn from(message: &Message) -> Self {
        Self::Typed(message.clone())
    }
}

/// Normalize `input` into a [`Message`], inferring the action of raw
/// records from `action`, then `type`, defaulting to `track`.
///
/// # Errors
///
/// Returns [`FacadeError::UnknownType`] for unregistered action names and
/// [`FacadeError::NotAnObject`] when a raw record is not a JSON object.
pub fn to_message(input: impl Into<MessageInput>) -> Result<Message, FacadeError> {
    match input.into() {
        MessageInput::Typed(message) => Ok(message),
        MessageInput::Raw(value) => {
            let fields = into_fields(value)?;
            let action = infer_action(&fields)?;
            Ok(Message::new(action, fields))
        }
    }
}

/// Build a message for a known action. Typed messages pass through as-is.
///
/// # Errors
///
/// Returns [`FacadeError::NotAnObject`] when a raw record is not an object.
pub fn to_message_as(
    action: Action,
    input: impl Into<MessageInput>,
) -> Result<Message, FacadeError> {
    match input.into() {
        MessageInput::Typed(message) => Ok(message),
        MessageInput::Raw(value) => Ok(Message::new(action, into_fields(value)?)),
    }
}

fn into_fields(value: Value) -> Result<Map<String, Value>, FacadeError> {
    match value {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Map::new()),
        other => Err(FacadeError::NotAnObject(json_type_name(&other))),
    }
}

fn infer_action(fields: &Map<String, Value>) -> Result<Action, FacadeError> {
    let named = ["action", "type"]
        .into_iter()
        .filter_map(|key| fields.get(key).and_then(Value::as_str))
        .find(|name| !name.is_empty());
    match named {
        Some(name) => name.parse(),
        None => Ok(Action::Track),
    }
}

/// Walk `path` (dot separated) through nested objects and arrays.
#[must_use]
pub fn lookup_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = fields.get(first)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// JSON type name used in error messages.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
