//! Integration settings: string keys to arbitrary JSON values

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::lookup_path;

/// Settings handed to an integration. Built up incrementally by the
/// assertion builder and passed read-only to the integration at run time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge every key of `other`, later values win.
    pub fn merge(&mut self, other: &Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key.clone(), value.clone());
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dotted-path lookup, e.g. `auth.token`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.0, path)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// `true` only for a JSON `true`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Settings {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Settings> for Value {
    fn from(settings: Settings) -> Self {
        Self::Object(settings.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_and_merge() {
        let mut settings = Settings::new();
        settings.set("key", "baz");
        let Value::Object(overlay) = json!({ "key": "qux", "text": true }) else {
            unreachable!()
        };
        settings.merge(&overlay);

        assert_eq!(settings.get_str("key"), Some("qux"));
        assert!(settings.get_bool("text"));
        assert!(!settings.get_bool("missing"));
    }

    #[test]
    fn path_lookup() {
        let mut settings = Settings::new();
        settings.set("auth", json!({ "token": "t" }));
        assert_eq!(settings.get_path("auth.token"), Some(&json!("t")));
    }

    #[test]
    fn transparent_serde() {
        let settings: Settings = serde_json::from_str(r#"{"times": 3}"#).unwrap();
        assert_eq!(settings.get_u64("times"), Some(3));
        assert_eq!(Value::from(settings), json!({ "times": 3 }));
    }
}
