//! sendcheck-runner: Run analytics integrations and assert on the requests they make
//!
//! An [`Integration`] maps messages to HTTP calls made through [`Http`].
//! An [`Assertion`] records expectations about those calls, runs the
//! integration with a capturing client, and reports the first mismatch.

pub mod assertion;
mod check;
pub mod error;
pub mod http;
pub mod integration;
mod query;
pub mod registry;

pub use assertion::{Assertion, RunState, TimeoutSpec};
pub use async_trait::async_trait;
pub use check::{Expected, Sent};
pub use error::Error;
pub use http::{Body, Capture, CapturedRequest, Headers, Http, Method, OutgoingRequest, Response};
pub use integration::{
    Integration, IntegrationError, MapFn, Mapper, Outcome, Responses, Scope, Validation,
    ValidationError, Validator, dispatch,
};
pub use query::ParseFn;
pub use registry::Target;
