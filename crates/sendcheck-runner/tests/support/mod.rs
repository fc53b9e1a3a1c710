//! Shared fixtures: a demo destination server and an integration that
//! sends to it.
//!
//! Settings understood by [`Segment`]:
//! - `key`: copied into the body and the `X-Key` header; the server
//!   rejects bodies without it
//! - `text`: send the body as `text/plain` to `/text/<action>`
//! - `query`: raw query string, default `baz=foo`
//! - `times`: number of concurrent requests; request `i` carries `foo=i`
//!   and later requests answer sooner
//! - `handle`: turn non-2xx responses into integration errors

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use futures::future::try_join_all;
use regex::Regex;
use sendcheck_core::{Action, Channel, Message, Settings};
use sendcheck_runner::{
    Http, Integration, Mapper, OutgoingRequest, Outcome, Validation, async_trait,
};
use serde_json::{Value, json};

/// Start the demo server on an ephemeral port; returns its base URL with a
/// trailing slash.
pub async fn serve() -> String {
    let app = Router::new()
        .route("/json/{action}", post(json_endpoint))
        .route("/text/{action}", post(text_endpoint));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind demo server");
    let addr = listener.local_addr().expect("demo server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("demo server");
    });
    format!("http://{addr}/")
}

async fn delay(query: &HashMap<String, String>) {
    if let Some(ms) = query.get("delay").and_then(|ms| ms.parse().ok()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn has_key(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|body| body.get("key").cloned())
        .is_some_and(|key| !key.is_null())
}

async fn json_endpoint(
    Path(_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> impl IntoResponse {
    delay(&query).await;
    if has_key(&body) {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "key required" })))
    }
}

async fn text_endpoint(
    Path(_action): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> impl IntoResponse {
    delay(&query).await;
    if has_key(&body) {
        "success=true"
    } else {
        "key required"
    }
}

/// Demo integration posting every message to the demo server.
pub struct Segment {
    endpoint: String,
    channels: Vec<Channel>,
}

impl Segment {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            channels: vec![Channel::Server],
        }
    }

    pub fn with_channels(mut self, channels: &[Channel]) -> Self {
        self.channels = channels.to_vec();
        self
    }
}

#[async_trait]
impl Integration for Segment {
    fn name(&self) -> &str {
        "Segment"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn retries(&self) -> u32 {
        3
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn channels(&self) -> Vec<Channel> {
        self.channels.clone()
    }

    fn validations(&self) -> Vec<Validation> {
        vec![
            Validation::settings("key"),
            Validation::message("event").methods(&[Action::Track]),
        ]
    }

    fn mapper(&self) -> Mapper<Self> {
        Mapper::new()
            .on(Action::Identify, map_identify)
            .on(Action::Track, map_track)
            .on_event(
                "completedOrder",
                Regex::new("(?i)^completed order$").expect("valid pattern"),
                map_completed_order,
            )
    }

    async fn identify(&self, message: &Message, settings: &Settings, http: &Http) -> Outcome {
        send(message, settings, http).await
    }

    async fn track(&self, message: &Message, settings: &Settings, http: &Http) -> Outcome {
        send(message, settings, http).await
    }

    async fn page(&self, message: &Message, settings: &Settings, http: &Http) -> Outcome {
        send(message, settings, http).await
    }

    async fn group(&self, message: &Message, settings: &Settings, http: &Http) -> Outcome {
        send(message, settings, http).await
    }

    async fn alias(&self, message: &Message, settings: &Settings, http: &Http) -> Outcome {
        send(message, settings, http).await
    }
}

fn build(message: &Message, settings: &Settings, http: &Http, query: &str) -> OutgoingRequest {
    let mut payload = message.fields().clone();
    if let Some(key) = settings.get("key") {
        payload.insert("key".into(), key.clone());
    }
    let text = settings.get_bool("text");
    let kind = if text { "text" } else { "json" };

    let request = http
        .post(&format!("{kind}/{}", message.action()))
        .query(query)
        .header(
            "Content-Type",
            if text { "text/plain" } else { "application/json" },
        );
    let request = match settings.get_str("key") {
        Some(key) => request.header("X-Key", key),
        None => request,
    };
    if text {
        request.text(Value::Object(payload).to_string())
    } else {
        request.json(&payload)
    }
}

async fn send(message: &Message, settings: &Settings, http: &Http) -> Outcome {
    let requests: Vec<OutgoingRequest> = match settings.get_u64("times") {
        None | Some(1) => vec![build(
            message,
            settings,
            http,
            settings.get_str("query").unwrap_or("baz=foo"),
        )],
        Some(times) => (0..times)
            .map(|i| {
                let delay = (times - i) * 20;
                build(message, settings, http, &format!("foo={i}&delay={delay}"))
            })
            .collect(),
    };

    let responses = try_join_all(requests.into_iter().map(OutgoingRequest::send)).await?;
    if settings.get_bool("handle") {
        for response in &responses {
            response.clone().error_for_status()?;
        }
    }
    Ok(responses.into())
}

fn map_identify(_: &Segment, message: &Message, settings: &Settings) -> Option<Value> {
    Some(json!({
        "id": message.user_id(),
        "email": message.get("traits.email"),
        "apiKey": settings.get_str("key"),
    }))
}

fn map_track(_: &Segment, message: &Message, _: &Settings) -> Option<Value> {
    Some(json!({
        "event": message.event(),
        "properties": message.get("properties").cloned().unwrap_or_else(|| json!({})),
    }))
}

fn map_completed_order(_: &Segment, message: &Message, _: &Settings) -> Option<Value> {
    let products = message.get("properties.products")?.as_array()?;
    let sent_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_millis()
        .to_string();
    Some(json!({
        "orderId": message.get("properties.orderId"),
        "total": message.get("properties.total"),
        "skus": products.iter().filter_map(|p| p.get("sku")).collect::<Vec<_>>(),
        "sentAt": sent_at,
    }))
}

/// Directory holding `fixtures/`.
pub fn tests_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests")
}
