//! Fixture-driven mapper assertions

use sendcheck_core::compare::{equals, is_truthy, strip_ignored};
use sendcheck_core::message::json_type_name;
use sendcheck_core::{Fixture, Settings, to_message};
use serde_json::Value;

use super::Assertion;
use crate::error::Error;
use crate::integration::Integration;

impl<I: Integration> Assertion<'_, I> {
    /// Load fixture `name` from the fixtures directory. Each call reads a
    /// fresh copy.
    ///
    /// # Errors
    ///
    /// Returns error if no fixtures directory is set or the file is invalid
    pub fn fixture(&self, name: &str) -> Result<Fixture, Error> {
        let dir = self
            .fixtures_dir
            .as_deref()
            .ok_or_else(|| Error::NoFixtureDir(name.to_string()))?;
        Ok(Fixture::load(dir, name)?)
    }

    /// Map the fixture's input and compare with its output.
    ///
    /// # Errors
    ///
    /// Returns error if the fixture cannot be loaded, no mapping applies,
    /// the mapping returns nothing, or the output differs
    pub fn maps(&self, name: &str) -> Result<&Self, Error> {
        self.maps_with::<&str>(name, None, &[])
    }

    /// [`Assertion::maps`] with explicit settings (replacing the builder's)
    /// and keys stripped from the mapped output before comparing.
    ///
    /// # Errors
    ///
    /// See [`Assertion::maps`]
    pub fn maps_with<S: AsRef<str>>(
        &self,
        name: &str,
        settings: Option<Value>,
        ignored: &[S],
    ) -> Result<&Self, Error> {
        let fixture = self.fixture(name)?;
        let message = to_message(fixture.input)?;

        let mut settings = match settings {
            Some(Value::Object(map)) => Settings::from(map),
            _ => self.settings.clone(),
        };
        if let Some(overlay) = &fixture.settings {
            settings.merge(overlay);
        }

        let (label, map) = self
            .mapper
            .resolve(&message)
            .ok_or_else(|| Error::MapperMissing(message.action().as_str().to_string()))?;
        tracing::debug!(fixture = name, mapper = label, "mapping fixture");

        let mut actual = match map(self.integration, &message, &settings) {
            Some(value) if is_truthy(&value) => value,
            other => {
                return Err(Error::MapperReturnedFalsy {
                    name: label.to_string(),
                    returned: other.as_ref().map_or("none", json_type_name).to_string(),
                });
            }
        };
        if !ignored.is_empty() {
            strip_ignored(&mut actual, ignored);
        }

        match equals(&actual, &fixture.output) {
            Some(failure) => Err(Error::Assertion(failure)),
            None => Ok(self),
        }
    }
}
