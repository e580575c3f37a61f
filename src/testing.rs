//! Test utilities: an in-memory [`ServiceClient`] with scripted routes and
//! canned service payloads.
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests under `tests/`.

use crate::client::ServiceClient;
use crate::config::VerifierConfig;
use crate::error::{RequestError, RequestResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(usize) -> RequestResult<Value> + Send + Sync>;

struct Route {
    responder: Responder,
    delay: Duration,
}

/// A [`ServiceClient`] that answers from per-route closures and records every
/// call it receives.
///
/// Each responder receives the zero-based number of earlier calls to the same
/// route, which makes progressing status sequences easy to script.
/// Unscripted routes answer HTTP 404.
#[derive(Default)]
pub struct ScriptedClient {
    routes: HashMap<(String, String), Route>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get<F>(self, path: &str, responder: F) -> Self
    where
        F: Fn(usize) -> RequestResult<Value> + Send + Sync + 'static,
    {
        self.route("GET", path, responder)
    }

    pub fn on_post<F>(self, path: &str, responder: F) -> Self
    where
        F: Fn(usize) -> RequestResult<Value> + Send + Sync + 'static,
    {
        self.route("POST", path, responder)
    }

    /// Delay every answer on an already scripted route.
    pub fn with_delay(mut self, method: &str, path: &str, delay: Duration) -> Self {
        if let Some(route) = self.routes.get_mut(&(method.to_string(), path.to_string())) {
            route.delay = delay;
        }
        self
    }

    fn route<F>(mut self, method: &str, path: &str, responder: F) -> Self
    where
        F: Fn(usize) -> RequestResult<Value> + Send + Sync + 'static,
    {
        self.routes.insert(
            (method.to_string(), path.to_string()),
            Route {
                responder: Box::new(responder),
                delay: Duration::ZERO,
            },
        );
        self
    }

    /// Every call so far, formatted as `"METHOD /path"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str, path: &str) -> usize {
        let key = format!("{} {}", method, path);
        self.calls().iter().filter(|c| **c == key).count()
    }

    async fn dispatch(&self, method: &str, path: &str) -> RequestResult<Value> {
        let key = format!("{} {}", method, path);
        let index = match self.calls.lock() {
            Ok(mut calls) => {
                let index = calls.iter().filter(|c| **c == key).count();
                calls.push(key);
                index
            }
            Err(_) => 0,
        };

        match self.routes.get(&(method.to_string(), path.to_string())) {
            Some(route) => {
                if !route.delay.is_zero() {
                    tokio::time::sleep(route.delay).await;
                }
                (route.responder)(index)
            }
            None => Err(RequestError::Service {
                status: 404,
                body: format!("no route for {} {}", method, path),
            }),
        }
    }
}

#[async_trait]
impl ServiceClient for ScriptedClient {
    async fn get(&self, path: &str, _timeout: Duration) -> RequestResult<Value> {
        self.dispatch("GET", path).await
    }

    async fn post(&self, path: &str, _body: &Value, _timeout: Duration) -> RequestResult<Value> {
        self.dispatch("POST", path).await
    }
}

/// Configuration with short windows suitable for tests.
pub fn fast_config() -> VerifierConfig {
    VerifierConfig {
        health_timeout_ms: 200,
        status_timeout_ms: 20,
        sign_timeout_ms: 1_000,
        poll_interval_ms: 30,
        baseline_window_ms: 120,
        sign_monitor_window_ms: 150,
        settle_delay_ms: 0,
        ..VerifierConfig::default()
    }
}

/// A `/health` reply
pub fn health_json() -> Value {
    json!({
        "service": "frost-t-demo",
        "version": "0.1.0",
        "status": "ok"
    })
}

/// A `/status` reply with no events
pub fn status_json(phase: &str, progress: f64, messages: u64, bytes: u64, retries: u64) -> Value {
    json!({
        "current_phase": phase,
        "progress": progress,
        "total_messages": messages,
        "total_bytes": bytes,
        "total_retries": retries,
        "rssi": -80,
        "recent_events": []
    })
}

/// A `/status` reply carrying the given event log
pub fn status_with_events(events: Vec<Value>) -> Value {
    let mut status = status_json("Complete", 1.0, 6, 768, 1);
    status["recent_events"] = Value::Array(events);
    status
}

/// A well-formed, verified `/sign` reply
pub fn signed_response() -> Value {
    json!({
        "message": "bitcoin++ Taipei 2025 - FROST-T Demo",
        "signer_ids": [1, 2, 3],
        "signature": "ab".repeat(64),
        "verified": true
    })
}
