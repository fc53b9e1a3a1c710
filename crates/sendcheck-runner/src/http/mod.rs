//! HTTP client handed to integrations
//!
//! Integrations build requests with [`Http::get`], [`Http::post`] and
//! friends, then [`OutgoingRequest::send`] them. When the client was
//! created by an assertion run, every request is also recorded in a
//! [`Capture`] so the run can check what was sent and what came back.

mod capture;

use std::time::Duration;

pub use capture::{Capture, CapturedRequest};
pub use reqwest::Method;

use capture::Snapshot;
use reqwest::header::HeaderValue;
use sendcheck_core::HeaderSource;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::integration::IntegrationError;

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any existing value regardless of case.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl HeaderSource for Headers {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl From<&reqwest::header::HeaderMap> for Headers {
    fn from(map: &reqwest::header::HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }
        headers
    }
}

/// Request body as the integration supplied it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Text(String),
}

impl Body {
    /// Structured view: JSON bodies as-is, text as a JSON string.
    #[must_use]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    /// Wire form of the body.
    #[must_use]
    pub fn serialized(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// A completed response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    /// Raw response text
    pub text: String,
    /// Text parsed as JSON, `Null` when it is not JSON
    pub body: Value,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            headers: Headers::new(),
            text,
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Turn a non-2xx response into [`IntegrationError::Status`].
    ///
    /// # Errors
    ///
    /// Returns error if the status is outside 200..300
    pub fn error_for_status(self) -> Result<Self, IntegrationError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(IntegrationError::Status {
            status: self.status,
            message: self.text,
        })
    }

    async fn read(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let text = response.text().await?;
        Ok(Self {
            headers,
            ..Self::new(status, text)
        })
    }
}

impl HeaderSource for Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Client handed to integration handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Http {
    client: reqwest::Client,
    base: Option<Url>,
    timeout: Option<Duration>,
    capture: Option<Capture>,
}

impl Http {
    /// Plain client. Relative request URLs resolve against `base`.
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base: &str) -> Self {
        let base = if base.is_empty() {
            None
        } else {
            Url::parse(base)
                .inspect_err(|e| tracing::warn!(base, error = %e, "ignoring invalid endpoint"))
                .ok()
        };
        Self {
            client,
            base,
            timeout: None,
            capture: None,
        }
    }

    /// Client whose requests are recorded in `capture`.
    pub(crate) fn intercepted(base: &str, timeout: Duration, capture: Capture) -> Self {
        Self {
            timeout: Some(timeout),
            capture: Some(capture),
            ..Self::new(base)
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Start a request. Under capture, this reserves the request's index.
    pub fn request(&self, method: Method, url: &str) -> OutgoingRequest {
        let slot = self
            .capture
            .as_ref()
            .map(|capture| capture.reserve(method.clone(), url));
        OutgoingRequest {
            http: self.clone(),
            method,
            url: url.to_string(),
            query: Vec::new(),
            headers: Headers::new(),
            body: Body::Empty,
            invalid: None,
            slot,
        }
    }

    pub fn get(&self, url: &str) -> OutgoingRequest {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> OutgoingRequest {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> OutgoingRequest {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> OutgoingRequest {
        self.request(Method::DELETE, url)
    }
}

/// Request under construction.
#[derive(Debug)]
#[must_use = "requests do nothing until sent"]
pub struct OutgoingRequest {
    http: Http,
    method: Method,
    url: String,
    query: Vec<String>,
    headers: Headers,
    body: Body,
    invalid: Option<String>,
    slot: Option<usize>,
}

impl OutgoingRequest {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Append a raw query segment, e.g. `"baz=foo"`. A leading `?` is dropped.
    pub fn query(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let raw = raw.strip_prefix('?').map(str::to_string).unwrap_or(raw);
        if !raw.is_empty() {
            self.query.push(raw);
        }
        self
    }

    /// Append one form-encoded `key=value` pair.
    pub fn query_pair(mut self, key: &str, value: &str) -> Self {
        let pair = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        self.query.push(pair);
        self
    }

    /// JSON body. Sets `Content-Type: application/json` unless already set.
    pub fn json(mut self, body: &impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Body::Json(value),
            Err(e) => self.invalid = Some(e.to_string()),
        }
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Text(body.into());
        self
    }

    /// Send the request and read the whole response.
    ///
    /// Non-2xx statuses are *not* errors here; see
    /// [`Response::error_for_status`].
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Transport`] if the URL cannot be resolved
    /// or the exchange fails, [`IntegrationError::Other`] for a body that
    /// could not be serialized.
    pub async fn send(mut self) -> Result<Response, IntegrationError> {
        if matches!(self.body, Body::Json(_)) && self.headers.get("content-type").is_none() {
            self.headers.set("Content-Type", "application/json");
        }
        let outcome = self.execute().await;
        if let (Some(capture), Some(index)) = (&self.http.capture, self.slot) {
            capture.record_outcome(index, outcome.clone());
        }
        outcome
    }

    async fn execute(&self) -> Result<Response, IntegrationError> {
        let resolved = self.resolve();
        if let (Some(capture), Some(index)) = (&self.http.capture, self.slot) {
            let (url, path) = match &resolved {
                Ok(url) => (url.to_string(), path_and_query(url)),
                Err(_) => (self.url.clone(), self.url.clone()),
            };
            capture.record_request(
                index,
                Snapshot {
                    url,
                    path,
                    headers: self.headers.clone(),
                    body: self.body.clone(),
                },
            );
        }

        let url = resolved.map_err(|e| {
            IntegrationError::Transport(format!("invalid url {:?}: {e}", self.url))
        })?;
        if let Some(reason) = &self.invalid {
            return Err(IntegrationError::Other(format!(
                "invalid request body: {reason}"
            )));
        }

        let mut request = self.http.client.request(self.method.clone(), url);
        for (name, value) in self.headers.iter() {
            // Values that are not valid HTTP never reach the server
            if HeaderValue::from_str(value).is_ok() {
                request = request.header(name, value);
            } else {
                tracing::warn!(name, "skipping invalid header value");
            }
        }
        request = match &self.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Text(text) => request.body(text.clone()),
        };
        if let Some(timeout) = self.http.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;
        Response::read(response)
            .await
            .map_err(|e| IntegrationError::Transport(e.to_string()))
    }

    fn resolve(&self) -> Result<Url, url::ParseError> {
        let mut url = match (Url::parse(&self.url), &self.http.base) {
            (Ok(url), _) => url,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base.join(&self.url)?,
            (Err(e), _) => return Err(e),
        };
        if !self.query.is_empty() {
            let joined = {
                let mut parts: Vec<&str> = url.query().filter(|q| !q.is_empty()).into_iter().collect();
                parts.extend(self.query.iter().map(String::as_str));
                parts.join("&")
            };
            url.set_query(Some(&joined));
        }
        Ok(url)
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}
