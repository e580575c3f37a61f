//! Signing-cycle driver
//!
//! Takes a "before" snapshot, submits one sign request, takes an "after"
//! snapshot and checks the counter deltas between the two. A failed cycle is
//! terminal for the invocation; nothing here retries.

use crate::client::ServiceClient;
use crate::config::VerifierConfig;
use crate::error::{RequestError, TransportError};
use crate::sampler::StatusSampler;
use crate::types::{SignRequest, SignResponse, StatusSnapshot};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const SIGN_PATH: &str = "/sign";

/// Progress at or above this value counts as a completed transmission.
pub const PROGRESS_COMPLETE_THRESHOLD: f64 = 0.99;

/// Pass/fail flags derived from a before/after snapshot pair.
///
/// None of these are fatal; a failed flag is surfaced as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDeltas {
    pub byte_delta_ok: bool,
    pub message_delta_ok: bool,
    pub progress_reached_ok: bool,
}

impl CycleDeltas {
    /// Compare two snapshots. A missing side fails every check it is needed for.
    pub fn assess(before: Option<&StatusSnapshot>, after: Option<&StatusSnapshot>) -> Self {
        let (byte_delta_ok, message_delta_ok) = match (before, after) {
            (Some(before), Some(after)) => (
                after.total_bytes >= before.total_bytes,
                after.total_messages >= before.total_messages,
            ),
            _ => (false, false),
        };

        Self {
            byte_delta_ok,
            message_delta_ok,
            progress_reached_ok: after
                .map(|a| a.progress >= PROGRESS_COMPLETE_THRESHOLD)
                .unwrap_or(false),
        }
    }
}

/// A sign call that returned 2xx.
#[derive(Debug, Clone)]
pub struct CycleSuccess {
    /// Leniently decoded reply
    pub response: SignResponse,
    /// The reply exactly as received, for the validator
    pub raw: Value,
    pub before: Option<StatusSnapshot>,
    pub after: Option<StatusSnapshot>,
    pub deltas: CycleDeltas,
    /// Non-fatal problems met along the way
    pub warnings: Vec<String>,
}

/// Outcome of one signing cycle
#[derive(Debug, Clone)]
pub enum CycleResult {
    Success(Box<CycleSuccess>),
    /// The sign call exceeded its timeout
    TimedOut,
    /// The sign call could not reach the service
    Unreachable(TransportError),
    /// The service answered non-2xx
    ServiceRejected { status: u16, body: String },
}

impl CycleResult {
    pub fn success(&self) -> Option<&CycleSuccess> {
        match self {
            CycleResult::Success(success) => Some(&**success),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success().is_some()
    }
}

/// Drives one sign request against the service.
pub struct SigningCycleDriver<'a, C: ServiceClient + ?Sized> {
    client: &'a C,
    config: &'a VerifierConfig,
}

impl<'a, C: ServiceClient + ?Sized> SigningCycleDriver<'a, C> {
    pub fn new(client: &'a C, config: &'a VerifierConfig) -> Self {
        Self { client, config }
    }

    pub async fn run_cycle(&self, request: &SignRequest) -> CycleResult {
        let sampler = StatusSampler::new(self.client, self.config.status_timeout());
        let mut warnings = Vec::new();

        let before = match sampler.sample_once().await {
            Ok(snapshot) => {
                debug!(
                    "Before sign: total_bytes={}, progress={:.2}",
                    snapshot.total_bytes, snapshot.progress
                );
                Some(snapshot)
            }
            Err(err) => {
                warn!("Could not read status before signing: {}", err);
                warnings.push(format!("status before signing unavailable: {}", err));
                None
            }
        };

        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(err) => {
                return CycleResult::Unreachable(TransportError::Other(format!(
                    "failed to encode sign request: {}",
                    err
                )))
            }
        };

        info!(
            "Submitting sign request for {} signers",
            request.signer_ids.len()
        );
        let raw = match self
            .client
            .post(SIGN_PATH, &body, self.config.sign_timeout())
            .await
        {
            Ok(raw) => raw,
            Err(RequestError::Transport(TransportError::Timeout)) => {
                warn!("Sign request timed out after {:?}", self.config.sign_timeout());
                return CycleResult::TimedOut;
            }
            Err(RequestError::Transport(err)) => {
                warn!("Sign request could not reach the service: {}", err);
                return CycleResult::Unreachable(err);
            }
            Err(RequestError::Service { status, body }) => {
                warn!("Sign request rejected with HTTP {}", status);
                return CycleResult::ServiceRejected { status, body };
            }
            Err(RequestError::Shape { detail, body }) => {
                warn!("Sign reply is not JSON: {}", detail);
                warnings.push(format!("sign reply is not JSON: {}", detail));
                Value::String(body)
            }
        };

        let response = SignResponse::lenient(&raw);

        if !self.config.settle_delay().is_zero() {
            sleep(self.config.settle_delay()).await;
        }

        let after = match sampler.sample_once().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("Could not read status after signing: {}", err);
                warnings.push(format!("status after signing unavailable: {}", err));
                None
            }
        };

        let deltas = CycleDeltas::assess(before.as_ref(), after.as_ref());
        if !deltas.byte_delta_ok {
            warnings.push("total_bytes did not hold or grow across the cycle".to_string());
        }
        if !deltas.message_delta_ok {
            warnings.push("total_messages did not hold or grow across the cycle".to_string());
        }
        if !deltas.progress_reached_ok {
            warnings.push(format!(
                "progress did not reach {:.2} after the cycle",
                PROGRESS_COMPLETE_THRESHOLD
            ));
        }

        CycleResult::Success(Box::new(CycleSuccess {
            response,
            raw,
            before,
            after,
            deltas,
            warnings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::STATUS_PATH;
    use crate::testing::{fast_config, signed_response, status_json, ScriptedClient};

    fn snapshot(progress: f64, messages: u64, bytes: u64) -> StatusSnapshot {
        StatusSnapshot {
            current_phase: "Complete".to_string(),
            progress,
            total_messages: messages,
            total_bytes: bytes,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn test_half_progress_fails_completion_check() {
        let before = snapshot(0.0, 0, 0);
        let after = snapshot(0.5, 3, 192);

        let deltas = CycleDeltas::assess(Some(&before), Some(&after));
        assert!(!deltas.progress_reached_ok);
        assert!(deltas.byte_delta_ok);
        assert!(deltas.message_delta_ok);
    }

    #[test]
    fn test_unchanged_counters_pass() {
        let before = snapshot(1.0, 6, 768);
        let after = snapshot(1.0, 6, 768);

        let deltas = CycleDeltas::assess(Some(&before), Some(&after));
        assert_eq!(
            deltas,
            CycleDeltas {
                byte_delta_ok: true,
                message_delta_ok: true,
                progress_reached_ok: true,
            }
        );
    }

    #[test]
    fn test_decreasing_bytes_fail() {
        let before = snapshot(1.0, 6, 768);
        let after = snapshot(1.0, 6, 100);
        assert!(!CycleDeltas::assess(Some(&before), Some(&after)).byte_delta_ok);
    }

    #[test]
    fn test_missing_before_fails_deltas_only() {
        let after = snapshot(1.0, 6, 768);
        let deltas = CycleDeltas::assess(None, Some(&after));
        assert!(!deltas.byte_delta_ok);
        assert!(!deltas.message_delta_ok);
        assert!(deltas.progress_reached_ok);
    }

    #[tokio::test]
    async fn test_successful_cycle() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |call| {
                if call == 0 {
                    Ok(status_json("Idle", 0.0, 0, 0, 0))
                } else {
                    Ok(status_json("Complete", 1.0, 6, 768, 2))
                }
            })
            .on_post(SIGN_PATH, |_| Ok(signed_response()));
        let config = fast_config();

        let result = SigningCycleDriver::new(&client, &config)
            .run_cycle(&config.sign_request())
            .await;

        let success = result.success().unwrap();
        assert!(success.response.verified);
        assert_eq!(success.response.signer_ids, vec![1, 2, 3]);
        assert_eq!(success.before.as_ref().unwrap().total_bytes, 0);
        assert_eq!(success.after.as_ref().unwrap().total_bytes, 768);
        assert!(success.deltas.byte_delta_ok);
        assert!(success.deltas.progress_reached_ok);
        assert!(success.warnings.is_empty());
        assert_eq!(
            client.calls(),
            vec!["GET /status", "POST /sign", "GET /status"]
        );
    }

    #[tokio::test]
    async fn test_stalled_progress_is_a_warning_not_a_failure() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |call| {
                Ok(status_json("Round2SignatureShare", 0.5 * call as f64, 3, 192, 0))
            })
            .on_post(SIGN_PATH, |_| Ok(signed_response()));
        let config = fast_config();

        let result = SigningCycleDriver::new(&client, &config)
            .run_cycle(&config.sign_request())
            .await;

        let success = result.success().unwrap();
        assert!(!success.deltas.progress_reached_ok);
        assert_eq!(success.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_sign_failures_map_to_cycle_results() {
        let config = fast_config();
        let request = config.sign_request();

        let timed_out = ScriptedClient::new()
            .on_get(STATUS_PATH, |_| Ok(status_json("Idle", 0.0, 0, 0, 0)))
            .on_post(SIGN_PATH, |_| Err(TransportError::Timeout.into()));
        assert!(matches!(
            SigningCycleDriver::new(&timed_out, &config).run_cycle(&request).await,
            CycleResult::TimedOut
        ));

        let refused = ScriptedClient::new()
            .on_post(SIGN_PATH, |_| Err(TransportError::ConnectionRefused.into()));
        assert!(matches!(
            SigningCycleDriver::new(&refused, &config).run_cycle(&request).await,
            CycleResult::Unreachable(TransportError::ConnectionRefused)
        ));

        let rejected = ScriptedClient::new()
            .on_get(STATUS_PATH, |_| Ok(status_json("Idle", 0.0, 0, 0, 0)))
            .on_post(SIGN_PATH, |_| {
                Err(RequestError::Service {
                    status: 400,
                    body: "not enough signers".to_string(),
                })
            });
        match SigningCycleDriver::new(&rejected, &config).run_cycle(&request).await {
            CycleResult::ServiceRejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "not enough signers");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(rejected.call_count("GET", STATUS_PATH), 1);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_tolerated() {
        let client = ScriptedClient::new()
            .on_get(STATUS_PATH, |_| Ok(status_json("Complete", 1.0, 6, 768, 0)))
            .on_post(SIGN_PATH, |_| {
                Err(RequestError::Shape {
                    detail: "expected value".to_string(),
                    body: "signed!".to_string(),
                })
            });
        let config = fast_config();

        let result = SigningCycleDriver::new(&client, &config)
            .run_cycle(&config.sign_request())
            .await;

        let success = result.success().unwrap();
        assert_eq!(success.raw, Value::String("signed!".to_string()));
        assert_eq!(success.response, SignResponse::default());
    }
}
