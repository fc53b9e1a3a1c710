//! `sendcheck new`: write a fixture skeleton for one action

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use sendcheck_core::{Action, Fixture};
use serde_json::{Value, json};

/// Sample input for `action`, with the fields its mapper usually reads.
fn sample_input(action: Action) -> Value {
    let fields = match action {
        Action::Identify => json!({ "userId": "user-id", "traits": { "email": "user@example.com" } }),
        Action::Track => json!({ "userId": "user-id", "event": "Event Name", "properties": {} }),
        Action::Page | Action::Screen => {
            json!({ "userId": "user-id", "name": "Home", "properties": {} })
        }
        Action::Group => json!({ "userId": "user-id", "groupId": "group-id", "traits": {} }),
        Action::Alias => json!({ "previousId": "previous-id", "userId": "user-id" }),
    };
    let mut input = json!({ "type": action.as_str() });
    if let (Some(input), Value::Object(fields)) = (input.as_object_mut(), fields) {
        input.extend(fields);
    }
    input
}

/// Fixture skeleton for `action`. The output is left empty.
pub fn template(action: Action) -> Fixture {
    Fixture {
        input: sample_input(action),
        output: json!({}),
        settings: None,
    }
}

/// Write `<dir>/<name>.json`. Existing files are never overwritten.
pub fn write_fixture(dir: &Path, name: &str, action: Action) -> Result<PathBuf> {
    let path = Fixture::path(dir, name);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::create_dir_all(dir)?;
    let content = serde_json::to_string_pretty(&template(action))?;
    std::fs::write(&path, content + "\n")?;
    tracing::debug!(path = %path.display(), %action, "fixture written");
    Ok(path)
}
