//! Immediate assertions on the integration's static configuration

use std::time::Duration;

use sendcheck_core::compare::equals;
use sendcheck_core::{Channel, Failure, FailureKind, MessageInput, Settings, to_message};
use serde_json::{Map, Value, json};

use super::Assertion;
use crate::error::Error;
use crate::integration::{Integration, Scope};

/// An expected timeout: milliseconds, a [`Duration`], or text such as
/// `"1s"`, `"500ms"` or `"1000"` (plain numbers are milliseconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutSpec {
    Millis(u64),
    Text(String),
    Duration(Duration),
}

impl TimeoutSpec {
    /// # Errors
    ///
    /// Returns error if text is neither a number nor a humantime duration
    pub fn to_duration(&self) -> Result<Duration, Error> {
        match self {
            Self::Millis(ms) => Ok(Duration::from_millis(*ms)),
            Self::Duration(duration) => Ok(*duration),
            Self::Text(text) => {
                let text = text.trim();
                if let Ok(ms) = text.parse::<u64>() {
                    return Ok(Duration::from_millis(ms));
                }
                humantime::parse_duration(text)
                    .map_err(|e| Error::InvalidTimeout(text.to_string(), e.to_string()))
            }
        }
    }
}

impl From<u64> for TimeoutSpec {
    fn from(ms: u64) -> Self {
        Self::Millis(ms)
    }
}

impl From<u32> for TimeoutSpec {
    fn from(ms: u32) -> Self {
        Self::Millis(u64::from(ms))
    }
}

impl From<i32> for TimeoutSpec {
    fn from(ms: i32) -> Self {
        u64::try_from(ms).map_or_else(|_| Self::Text(ms.to_string()), Self::Millis)
    }
}

impl From<&str> for TimeoutSpec {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TimeoutSpec {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Duration> for TimeoutSpec {
    fn from(duration: Duration) -> Self {
        Self::Duration(duration)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn mismatch(message: String, actual: impl Into<Value>, expected: impl Into<Value>) -> Error {
    Error::Assertion(Failure::new(
        FailureKind::Configuration,
        message,
        actual,
        expected,
    ))
}

impl<I: Integration> Assertion<'_, I> {
    /// # Errors
    ///
    /// Returns error if the integration's name differs
    pub fn name(&self, expected: &str) -> Result<&Self, Error> {
        let actual = self.integration.name();
        if actual != expected {
            return Err(mismatch(
                format!("expected name to be \"{expected}\" but it's \"{actual}\""),
                actual,
                expected,
            ));
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns error if the retry count differs
    pub fn retries(&self, expected: u32) -> Result<&Self, Error> {
        let actual = self.integration.retries();
        if actual != expected {
            return Err(mismatch(
                format!("expected retries to be \"{expected}\" but it's \"{actual}\""),
                actual,
                expected,
            ));
        }
        Ok(self)
    }

    /// Compared in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns error if the timeout differs or `expected` cannot be parsed
    pub fn timeout(&self, expected: impl Into<TimeoutSpec>) -> Result<&Self, Error> {
        let expected = millis(expected.into().to_duration()?);
        let actual = millis(self.integration.timeout());
        if actual != expected {
            return Err(mismatch(
                format!("expected timeout to be \"{expected}\" but it's \"{actual}\""),
                actual,
                expected,
            ));
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns error if the endpoint differs
    pub fn endpoint(&self, expected: &str) -> Result<&Self, Error> {
        let actual = self.integration.endpoint();
        if actual != expected {
            return Err(mismatch(
                format!("expected endpoint to be \"{expected}\" but it's \"{actual}\""),
                actual,
                expected,
            ));
        }
        Ok(self)
    }

    /// Order-insensitive; duplicates count.
    ///
    /// # Errors
    ///
    /// Returns error showing both sorted lists if they differ
    pub fn channels(&self, expected: &[Channel]) -> Result<&Self, Error> {
        let mut actual: Vec<&str> = self
            .integration
            .channels()
            .into_iter()
            .map(Channel::as_str)
            .collect();
        let mut expected: Vec<&str> = expected.iter().map(|c| c.as_str()).collect();
        actual.sort_unstable();
        expected.sort_unstable();
        let (actual, expected) = (json!(actual), json!(expected));
        match equals(&actual, &expected) {
            Some(failure) => Err(mismatch(failure.message, actual, expected)),
            None => Ok(self),
        }
    }

    /// Assert a validation is registered at `path` (`message.<field>` or
    /// `settings.<field>`) with exactly `expected_meta` (default `{}`).
    ///
    /// # Errors
    ///
    /// Returns error if no such validation exists or its meta differs
    pub fn ensure(&self, path: &str, expected_meta: Option<Value>) -> Result<&Self, Error> {
        let unregistered = || Error::UnregisteredValidation(path.to_string());
        let (scope, field) = path.split_once('.').ok_or_else(unregistered)?;
        let scope: Scope = scope.parse().map_err(|_| unregistered())?;
        let validation = self
            .integration
            .validations()
            .into_iter()
            .find(|validation| validation.scope == scope && validation.path == field)
            .ok_or_else(unregistered)?;

        let expected = expected_meta.unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(failure) = equals(&Value::Object(validation.meta), &expected) {
            return Err(Error::Assertion(failure.with_context("validation meta mismatch:")));
        }
        Ok(self)
    }

    /// `settings` (an object) is merged over the current settings.
    ///
    /// # Errors
    ///
    /// Returns the validation error if validation fails
    pub fn valid(
        &self,
        message: impl Into<MessageInput>,
        settings: Option<Value>,
    ) -> Result<&Self, Error> {
        let message = to_message(message)?;
        self.integration
            .validate(&message, &self.merged(settings))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns error if validation passes
    pub fn invalid(
        &self,
        message: impl Into<MessageInput>,
        settings: Option<Value>,
    ) -> Result<&Self, Error> {
        let message = to_message(message)?;
        match self.integration.validate(&message, &self.merged(settings)) {
            Ok(()) => Err(Error::ExpectedInvalid),
            Err(err) => {
                tracing::debug!(error = %err, "validation failed as expected");
                Ok(self)
            }
        }
    }

    /// # Errors
    ///
    /// Returns error if the integration is disabled for `message`
    pub fn enabled(&self, message: impl Into<MessageInput>) -> Result<&Self, Error> {
        let message = to_message(message)?;
        if !self.integration.enabled(&message, &self.settings) {
            return Err(mismatch(
                format!("expected integration to be enabled for {}", message.json()),
                false,
                true,
            ));
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns error if the integration is enabled for `message`
    pub fn disabled(&self, message: impl Into<MessageInput>) -> Result<&Self, Error> {
        let message = to_message(message)?;
        if self.integration.enabled(&message, &self.settings) {
            return Err(mismatch(
                format!("expected integration to be disabled for {}", message.json()),
                true,
                false,
            ));
        }
        Ok(self)
    }

    /// Enabled for an empty track message from `channel`.
    ///
    /// # Errors
    ///
    /// Returns error if the integration is disabled on `channel`
    pub fn channel(&self, channel: Channel) -> Result<&Self, Error> {
        self.channel_with(channel, Value::Null)
    }

    /// Enabled for `message` sent from `channel`.
    ///
    /// # Errors
    ///
    /// Returns error if the integration is disabled on `channel`
    pub fn channel_with(
        &self,
        channel: Channel,
        message: impl Into<MessageInput>,
    ) -> Result<&Self, Error> {
        let message = to_message(message)?.with_channel(channel);
        if !self.integration.enabled(&message, &self.settings) {
            return Err(mismatch(
                format!("expected integration to be enabled on \"{channel}\""),
                false,
                true,
            ));
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns error if disabled on the server channel
    pub fn server(&self) -> Result<&Self, Error> {
        self.channel(Channel::Server)
    }

    /// # Errors
    ///
    /// Returns error if disabled on the client channel
    pub fn client(&self) -> Result<&Self, Error> {
        self.channel(Channel::Client)
    }

    /// # Errors
    ///
    /// Returns error if disabled on the mobile channel
    pub fn mobile(&self) -> Result<&Self, Error> {
        self.channel(Channel::Mobile)
    }

    /// Enabled on every channel.
    ///
    /// # Errors
    ///
    /// Returns error naming the channels it is disabled on
    pub fn all(&self) -> Result<&Self, Error> {
        self.all_with(Value::Null)
    }

    /// # Errors
    ///
    /// Returns error naming the channels it is disabled on
    pub fn all_with(&self, message: impl Into<MessageInput>) -> Result<&Self, Error> {
        let message = to_message(message)?;
        let disabled: Vec<&str> = Channel::ALL
            .into_iter()
            .filter(|channel| {
                let message = message.clone().with_channel(*channel);
                !self.integration.enabled(&message, &self.settings)
            })
            .map(Channel::as_str)
            .collect();
        if !disabled.is_empty() {
            return Err(mismatch(
                format!(
                    "expected message to be enabled on all channels, but it is disabled on \"{}\"",
                    disabled.join(", ")
                ),
                json!(disabled),
                json!([]),
            ));
        }
        Ok(self)
    }

    fn merged(&self, overlay: Option<Value>) -> Settings {
        let mut settings = self.settings.clone();
        if let Some(Value::Object(map)) = overlay {
            settings.merge(&map);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::Validation;
    use sendcheck_core::Action;

    struct Configured;

    impl Integration for Configured {
        fn name(&self) -> &str {
            "Segment.io"
        }

        fn endpoint(&self) -> &str {
            "http://localhost:3000"
        }

        fn retries(&self) -> u32 {
            2
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        fn channels(&self) -> Vec<Channel> {
            vec![Channel::Server, Channel::Server, Channel::Client]
        }

        fn validations(&self) -> Vec<Validation> {
            vec![
                Validation::settings("apiKey"),
                Validation::message("event").methods(&[Action::Track]),
            ]
        }
    }

    #[test]
    fn name_retries_endpoint() {
        let assertion = Assertion::new(&Configured);
        assert!(assertion.name("Segment.io").is_ok());
        assert!(assertion.retries(2).is_ok());
        assert!(assertion.endpoint("http://localhost:3000").is_ok());

        let err = assertion.name("Other").unwrap_err();
        assert_eq!(err.to_string(), r#"expected name to be "Other" but it's "Segment.io""#);
        let err = assertion.retries(5).unwrap_err();
        assert_eq!(err.failure().map(|f| f.kind), Some(FailureKind::Configuration));
    }

    #[test]
    fn timeout_forms() {
        let assertion = Assertion::new(&Configured);
        assert!(assertion.timeout(1000).is_ok());
        assert!(assertion.timeout("1s").is_ok());
        assert!(assertion.timeout("1000").is_ok());
        assert!(assertion.timeout(Duration::from_millis(1000)).is_ok());

        let err = assertion.timeout("2s").unwrap_err();
        assert_eq!(err.to_string(), r#"expected timeout to be "2000" but it's "1000""#);
        assert!(matches!(assertion.timeout("soon"), Err(Error::InvalidTimeout(_, _))));
        assert!(matches!(assertion.timeout(-5), Err(Error::InvalidTimeout(_, _))));
    }

    #[test]
    fn channels_sorted_multiset() {
        let assertion = Assertion::new(&Configured);
        assert!(
            assertion
                .channels(&[Channel::Client, Channel::Server, Channel::Server])
                .is_ok()
        );
        let err = assertion.channels(&[Channel::Server, Channel::Client]).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"expected ["client","server"] but got ["client","server","server"]"#
        );
        let failure = err.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Configuration);
        assert_eq!(failure.actual, json!(["client", "server", "server"]));
        assert_eq!(failure.expected, json!(["client", "server"]));
    }

    #[test]
    fn ensure_validations() {
        let assertion = Assertion::new(&Configured);
        assert!(assertion.ensure("settings.apiKey", None).is_ok());
        assert!(
            assertion
                .ensure("message.event", Some(json!({ "methods": ["track"] })))
                .is_ok()
        );

        let err = assertion.ensure("settings.token", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"expected integration to have validation for "settings.token""#
        );
        assert!(matches!(
            assertion.ensure("apiKey", None),
            Err(Error::UnregisteredValidation(_))
        ));

        let err = assertion.ensure("message.event", None).unwrap_err();
        assert!(err.to_string().starts_with("validation meta mismatch:"));
    }

    #[test]
    fn valid_and_invalid() {
        let assertion = Assertion::new(&Configured);
        let track = json!({ "type": "track", "event": "Signed Up" });
        assert!(assertion.valid(track.clone(), Some(json!({ "apiKey": "k" }))).is_ok());
        assert!(assertion.invalid(track.clone(), None).is_ok());
        assert!(matches!(
            assertion.valid(track.clone(), None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            assertion.invalid(track, Some(json!({ "apiKey": "k" }))),
            Err(Error::ExpectedInvalid)
        ));
    }

    #[test]
    fn channel_enablement() {
        let assertion = Assertion::new(&Configured);
        assert!(assertion.server().is_ok());
        assert!(assertion.client().is_ok());
        let err = assertion.mobile().unwrap_err();
        assert_eq!(err.to_string(), r#"expected integration to be enabled on "mobile""#);

        let err = assertion.all().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"expected message to be enabled on all channels, but it is disabled on "mobile""#
        );

        assert!(assertion.enabled(json!({ "channel": "client" })).is_ok());
        assert!(assertion.disabled(json!({ "channel": "mobile" })).is_ok());
        assert!(assertion.enabled(json!({ "channel": "mobile" })).is_err());
    }
}
