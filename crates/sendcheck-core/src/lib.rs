//! sendcheck-core: Message model and comparison primitives for integration assertions
//!
//! This crate provides the canonical analytics message facade, the
//! comparators that every assertion is built from, and the rich failure
//! type those comparators produce.

pub mod compare;
pub mod config;
pub mod fixture;
pub mod message;
pub mod settings;
pub mod verdict;

pub use compare::{HeaderMatch, HeaderSource};
pub use config::{Config, ConfigError};
pub use fixture::{Fixture, FixtureError};
pub use message::{
    Action, Channel, FacadeError, Message, MessageInput, to_message, to_message_as,
};
pub use settings::Settings;
pub use verdict::{Failure, FailureKind};
