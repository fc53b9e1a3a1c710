//! `sendcheck check`: validate fixture files
//!
//! Each `*.json` file in the directory must match the fixture schema and
//! its `input` must normalize into a message.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use sendcheck_core::fixture::generate_schema;
use sendcheck_core::{Fixture, to_message};
use serde::Serialize;
use serde_json::Value;

/// Problems found in one fixture file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub problems: Vec<String>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check every `*.json` file directly inside `dir`, in name order.
pub fn check_dir(dir: &Path) -> Result<Vec<FileReport>> {
    let schema: Value = serde_json::from_str(&generate_schema())?;
    let validator =
        jsonschema::validator_for(&schema).map_err(|e| anyhow!("invalid fixture schema: {e}"))?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read fixtures directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| check_file(path, &validator))
        .collect())
}

fn check_file(path: PathBuf, validator: &jsonschema::Validator) -> FileReport {
    let problems = match std::fs::read_to_string(&path) {
        Ok(content) => problems(&content, validator),
        Err(e) => vec![format!("cannot read: {e}")],
    };
    tracing::debug!(path = %path.display(), problems = problems.len(), "checked fixture");
    FileReport { path, problems }
}

fn problems(content: &str, validator: &jsonschema::Validator) -> Vec<String> {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => return vec![format!("invalid JSON: {e}")],
    };

    let violations: Vec<String> = validator
        .iter_errors(&value)
        .take(5)
        .map(|e| e.to_string())
        .collect();
    if !violations.is_empty() {
        return violations;
    }

    let fixture: Fixture = match serde_json::from_value(value) {
        Ok(fixture) => fixture,
        Err(e) => return vec![format!("not a fixture: {e}")],
    };
    match to_message(fixture.input) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("input: {e}")],
    }
}
