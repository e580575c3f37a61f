//! Response validator for `POST /sign` replies.
//!
//! Four independent checks against the raw JSON. Content is not compared with
//! the request: the service is the authority on what it echoes back.

use serde_json::Value;

/// Prefix the service uses to smuggle a failure through the signature field.
pub const SIGNATURE_ERROR_SENTINEL: &str = "Error:";

/// The checks applied to every sign reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCheck {
    Signature,
    Verified,
    Message,
    SignerIds,
}

impl ResponseCheck {
    pub const ALL: [ResponseCheck; 4] = [
        ResponseCheck::Signature,
        ResponseCheck::Verified,
        ResponseCheck::Message,
        ResponseCheck::SignerIds,
    ];

    pub fn field(&self) -> &'static str {
        match self {
            ResponseCheck::Signature => "signature",
            ResponseCheck::Verified => "verified",
            ResponseCheck::Message => "message",
            ResponseCheck::SignerIds => "signer_ids",
        }
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckDetail {
    pub check: ResponseCheck,
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed_count: usize,
    pub total_count: usize,
    pub details: Vec<CheckDetail>,
}

impl ValidationReport {
    pub fn all_passed(&self) -> bool {
        self.passed_count == self.total_count
    }
}

/// Score a sign reply. Every check runs regardless of earlier failures.
pub fn validate(response: &Value) -> ValidationReport {
    let details: Vec<CheckDetail> = ResponseCheck::ALL
        .iter()
        .map(|check| run_check(*check, response))
        .collect();

    ValidationReport {
        passed_count: details.iter().filter(|d| d.passed).count(),
        total_count: ResponseCheck::ALL.len(),
        details,
    }
}

fn run_check(check: ResponseCheck, response: &Value) -> CheckDetail {
    let field = response.get(check.field());

    let (passed, message) = match check {
        ResponseCheck::Signature => match field {
            None | Some(Value::Null) => (false, "missing signature field".to_string()),
            Some(Value::String(sig)) if sig.is_empty() => {
                (false, "signature field is empty".to_string())
            }
            Some(Value::String(sig)) if sig.starts_with(SIGNATURE_ERROR_SENTINEL) => {
                (false, format!("signature carries an error: {}", sig))
            }
            Some(Value::String(sig)) => (true, describe_signature(sig)),
            Some(other) => (false, format!("signature is not a string: {}", other)),
        },
        ResponseCheck::Verified => match field {
            Some(Value::Bool(true)) => (true, "verified = true".to_string()),
            Some(Value::Bool(false)) => (false, "verified = false".to_string()),
            None => (false, "missing verified field".to_string()),
            Some(other) => (false, format!("verified is not a boolean: {}", other)),
        },
        ResponseCheck::Message => match field {
            None | Some(Value::Null) => (false, "missing message field".to_string()),
            Some(Value::String(message)) => (true, format!("message: {}", message)),
            Some(other) => (true, format!("message: {}", other)),
        },
        ResponseCheck::SignerIds => match field {
            Some(ids @ Value::Array(_)) => (true, format!("signer_ids: {}", ids)),
            None => (false, "missing signer_ids field".to_string()),
            Some(other) => (false, format!("signer_ids is not a list: {}", other)),
        },
    };

    CheckDetail {
        check,
        passed,
        message,
    }
}

fn describe_signature(signature: &str) -> String {
    match hex::decode(signature) {
        Ok(bytes) => format!("signature present ({} bytes)", bytes.len()),
        Err(_) => "signature present (not hex-encoded)".to_string(),
    }
}
