//! Mapping fixtures: an input message paired with the expected mapped output
//!
//! Fixtures are plain JSON files named `<name>.json`:
//!
//! ```json
//! {
//!   "input": { "type": "identify", "userId": "u1" },
//!   "output": { "id": "u1" },
//!   "settings": { "apiKey": "k" }
//! }
//! ```

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One fixture document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    /// Raw input message, normalized through the message facade
    pub input: Value,
    /// Expected output of the integration's mapper
    pub output: Value,
    /// Settings overlay applied before mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Cannot read fixture {0}: {1}")]
    Io(PathBuf, String),
    #[error("Invalid fixture {0}: {1}")]
    Parse(PathBuf, String),
}

impl Fixture {
    /// Path of fixture `name` inside `dir`.
    #[must_use]
    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    /// Load fixture `name` from `dir`. Every call reads the file again,
    /// so callers always get a fresh, unshared copy.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a fixture document.
    pub fn load(dir: &Path, name: &str) -> Result<Self, FixtureError> {
        Self::load_file(&Self::path(dir, name))
    }

    /// Load a fixture from an explicit file path.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a fixture document.
    pub fn load_file(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FixtureError::Io(path.to_path_buf(), e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| FixtureError::Parse(path.to_path_buf(), e.to_string()))
    }
}

/// Generate the JSON Schema for fixture documents.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(Fixture);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}
