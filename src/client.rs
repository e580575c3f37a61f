//! HTTP client adapter for the signing service
//!
//! Every call performs exactly one attempt bounded by the caller's timeout.
//! Retry and backoff belong to the remote service and are only observed here.

use crate::error::{RequestError, RequestResult, TransportError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON request/response access to the service under test.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// `GET {base}{path}`, decoding a 2xx body as JSON
    async fn get(&self, path: &str, timeout: Duration) -> RequestResult<Value>;

    /// `POST {base}{path}` with a JSON body, decoding a 2xx body as JSON
    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> RequestResult<Value>;
}

/// [`ServiceClient`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: Client,
    base_url: String,
}

impl HttpServiceClient {
    /// Create a client for the given base endpoint, e.g. `http://127.0.0.1:3000`
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("frost-verify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder, timeout: Duration) -> RequestResult<Value> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RequestError::Transport(classify_transport_error(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RequestError::Transport(classify_transport_error(&e)))?;

        if !status.is_success() {
            warn!("Service answered HTTP {}", status.as_u16());
            return Err(RequestError::Service {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RequestError::Shape {
            detail: e.to_string(),
            body: text,
        })
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn get(&self, path: &str, timeout: Duration) -> RequestResult<Value> {
        let url = self.url(path);
        debug!("GET {} (timeout {:?})", url, timeout);
        self.execute(self.client.get(&url), timeout).await
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> RequestResult<Value> {
        let url = self.url(path);
        debug!("POST {} (timeout {:?})", url, timeout);
        let request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body);
        self.execute(request, timeout).await
    }
}

/// Map a `reqwest` failure onto the transport taxonomy.
///
/// Connect-phase failures count as refused unless the underlying I/O error
/// says otherwise (unreachable host, DNS failure).
pub fn classify_transport_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }

    if err.is_connect() {
        return match io_error_kind(err) {
            None | Some(std::io::ErrorKind::ConnectionRefused) => TransportError::ConnectionRefused,
            Some(kind) => TransportError::Other(format!("connect failed ({:?}): {}", kind, err)),
        };
    }

    TransportError::Other(err.to_string())
}

fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}
