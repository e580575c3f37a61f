//! Wire records exchanged with the signing service.
//!
//! Every field defaults when absent so a partially populated reply still
//! decodes; strict shape checking is the validator's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `GET /health` reply. Only presence of a 2xx matters; the fields are shown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthInfo {
    pub service: Option<String>,
    pub version: Option<String>,
    pub status: Option<String>,
}

impl HealthInfo {
    /// Decode a `/health` body. The reply only has to be 2xx, so callers may
    /// fall back to the default after reporting the error.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// One point-in-time read of `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Opaque phase label; the service may introduce new ones
    pub current_phase: String,
    /// Transmission progress, expected within `[0.0, 1.0]`
    pub progress: f64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub total_retries: u64,
    /// Simulated signal strength in dBm
    pub rssi: i64,
    /// Most-recent-last event log, kept raw for the decoder
    pub recent_events: Vec<Value>,
    /// Message counts per message type
    pub by_type: BTreeMap<String, u64>,
}

impl StatusSnapshot {
    /// Decode a `/status` body field by field. A missing or wrong-typed field
    /// falls back to its default; only a body that is not an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let Value::Object(mut fields) = value else {
            return Err(serde::de::Error::custom("status body is not a JSON object"));
        };
        let recent_events = match fields.remove("recent_events") {
            Some(Value::Array(events)) => events,
            _ => Vec::new(),
        };
        let counter = |name: &str| fields.get(name).and_then(Value::as_u64).unwrap_or_default();

        Ok(Self {
            current_phase: fields
                .get("current_phase")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            progress: fields
                .get("progress")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            total_messages: counter("total_messages"),
            total_bytes: counter("total_bytes"),
            total_retries: counter("total_retries"),
            rssi: fields.get("rssi").and_then(Value::as_i64).unwrap_or_default(),
            recent_events,
            by_type: fields
                .get("by_type")
                .and_then(Value::as_object)
                .map(|counts| {
                    counts
                        .iter()
                        .filter_map(|(kind, count)| Some((kind.clone(), count.as_u64()?)))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Phase label, or `"Unknown"` when the service left it blank.
    pub fn phase_label(&self) -> &str {
        if self.current_phase.is_empty() {
            "Unknown"
        } else {
            &self.current_phase
        }
    }
}

/// `POST /sign` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    pub message: String,
    pub signer_ids: Vec<u16>,
}

/// `POST /sign` reply, decoded leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignResponse {
    pub message: String,
    pub signer_ids: Vec<u16>,
    /// Hex-encoded aggregate signature, or an `"Error:"` sentinel
    pub signature: String,
    pub verified: bool,
}

impl SignResponse {
    /// Decode a sign reply. Fields that are missing or carry the wrong JSON
    /// type fall back to their defaults individually.
    pub fn lenient(value: &Value) -> Self {
        let field = |name: &str| value.get(name);

        Self {
            message: field("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            signer_ids: field("signer_ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_u64)
                        .filter_map(|id| u16::try_from(id).ok())
                        .collect()
                })
                .unwrap_or_default(),
            signature: field("signature")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            verified: field("verified").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}
