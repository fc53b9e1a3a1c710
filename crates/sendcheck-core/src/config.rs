//! Project configuration for integration assertions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `<name>.json` mapping fixtures
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,

    /// Settings merged into every assertion after the integration's own
    #[serde(default)]
    pub settings: Map<String, Value>,

    /// Default tracing filter for the CLI, e.g. "sendcheck=debug"
    #[serde(default)]
    pub log: Option<String>,
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("tests/fixtures")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
            settings: Map::new(),
            log: None,
        }
    }
}

impl Config {
    /// Load config from file. Format follows the extension: `.json`,
    /// `.yaml`/`.yml`, anything else is read as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            _ => toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load from default location (.sendcheck.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a candidate file exists but cannot be parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_default_in(Path::new("."))
    }

    /// Like [`Config::load_default`], probing inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if a candidate file exists but cannot be parsed
    pub fn load_default_in(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".sendcheck.toml", ".sendcheck.json", "sendcheck.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    /// Create example config file
    #[must_use]
    pub fn example() -> &'static str {
        r#"# sendcheck configuration

# Directory containing <name>.json mapping fixtures
fixtures_dir = "tests/fixtures"

# Tracing filter used by the CLI (overridden by RUST_LOG / --verbose)
# log = "sendcheck=debug"

# Settings merged into every assertion
[settings]
# apiKey = "test-key"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
