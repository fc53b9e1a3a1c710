//! Ordered record of every request an integration makes during one run
//!
//! Slots are reserved when a request is *created*, so indices follow
//! call order even when sends complete out of order. The request snapshot
//! is written when the send starts; the outcome is stamped onto the same
//! slot when it completes.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Method;
use sendcheck_core::HeaderSource;
use sendcheck_core::compare::split_path;

use super::{Body, Headers, Response};
use crate::integration::IntegrationError;

/// One observed request and, once finished, its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRequest {
    /// Zero-based position in creation order
    pub index: usize,
    pub method: Method,
    /// Absolute URL as sent
    pub url: String,
    /// Path plus query string, e.g. `/json/track?baz=foo`
    pub path: String,
    pub headers: Headers,
    pub body: Body,
    /// Set once the send began
    pub sent: bool,
    /// `None` until the send completed
    pub outcome: Option<Result<Response, IntegrationError>>,
}

impl CapturedRequest {
    /// Empty slot for a request that has been created but not sent.
    #[must_use]
    pub fn pending(index: usize, method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            index,
            method,
            path: url.clone(),
            url,
            headers: Headers::new(),
            body: Body::Empty,
            sent: false,
            outcome: None,
        }
    }

    #[must_use]
    pub fn pathname(&self) -> &str {
        split_path(&self.path).0
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        split_path(&self.path).1
    }

    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().ok())
    }

    #[must_use]
    pub fn error(&self) -> Option<&IntegrationError> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().err())
    }
}

impl HeaderSource for CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// What the request looked like at the moment it was sent.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub url: String,
    pub path: String,
    pub headers: Headers,
    pub body: Body,
}

/// Shared, append-only request log. Cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl Capture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot; returns its index.
    pub(crate) fn reserve(&self, method: Method, url: &str) -> usize {
        let mut requests = self.requests.lock();
        let index = requests.len();
        tracing::debug!(index, %method, url, "request created");
        requests.push(CapturedRequest::pending(index, method, url));
        index
    }

    pub(crate) fn record_request(&self, index: usize, snapshot: Snapshot) {
        let mut requests = self.requests.lock();
        if let Some(slot) = requests.get_mut(index) {
            tracing::debug!(index, path = %snapshot.path, "request sent");
            slot.url = snapshot.url;
            slot.path = snapshot.path;
            slot.headers = snapshot.headers;
            slot.body = snapshot.body;
            slot.sent = true;
        }
    }

    pub(crate) fn record_outcome(&self, index: usize, outcome: Result<Response, IntegrationError>) {
        let mut requests = self.requests.lock();
        if let Some(slot) = requests.get_mut(index) {
            match &outcome {
                Ok(response) => tracing::debug!(index, status = response.status, "response received"),
                Err(err) => tracing::debug!(index, error = %err, "request failed"),
            }
            slot.outcome = Some(outcome);
        }
    }

    /// Number of requests created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the log in creation order.
    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().clone()
    }
}
