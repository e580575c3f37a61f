//! Error taxonomy for the verification harness.
//!
//! Transport failures, non-2xx service replies and malformed bodies are kept
//! apart so each phase can decide whether the failure is fatal (health) or
//! recoverable (monitoring, event inspection).

use std::path::PathBuf;

/// Failure to complete an HTTP exchange at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Nothing is listening at the configured endpoint
    #[error("connection refused")]
    ConnectionRefused,

    /// The per-call timeout elapsed before a response arrived
    #[error("request timed out")]
    Timeout,

    /// Any other I/O or protocol failure
    #[error("transport error: {0}")]
    Other(String),
}

/// Outcome of a single adapter call that did not yield a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered, but with a non-2xx status
    #[error("service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },

    /// The service answered 2xx but the body was not JSON
    #[error("malformed response body: {detail}")]
    Shape { detail: String, body: String },
}

impl RequestError {
    /// True when the per-call timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Transport(TransportError::Timeout))
    }

    /// HTTP status carried by a service rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type RequestResult<T> = Result<T, RequestError>;

/// A sampling window that never obtained a snapshot.
///
/// Distinct from a window whose snapshots all report zero progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SamplerError {
    #[error("no status snapshot obtained ({failed_ticks} failed polls)")]
    NoSnapshots { failed_ticks: usize },
}

/// Errors raised while loading or validating [`crate::config::VerifierConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {variable}: {value}")]
    Environment { variable: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
