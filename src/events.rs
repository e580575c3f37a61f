//! Event-log decoder
//!
//! Classifies the raw `recent_events` entries of a status snapshot. The
//! service's event vocabulary is open-ended: an unrecognised tag becomes
//! [`Event::Unknown`] instead of an error.
//!
//! Two encodings are accepted:
//!
//! - internally tagged: `{"type": "PacketLost", "fragment_id": 3, "retry_count": 1}`
//! - externally tagged: `{"PacketLost": {"fragment_id": 3, "retry_count": 1}}`

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Upper bound on decoded entries; the newest are kept.
pub const MAX_DECODED_EVENTS: usize = 10;

const TYPE_TAG: &str = "type";

/// A classified transmission event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TransmitStart {
        from: String,
        to: String,
        message_type: String,
        total_bytes: Option<u64>,
        fragments: Option<u64>,
    },
    TransmitFragment {
        fragment_id: u64,
        total_fragments: u64,
        bytes: u64,
    },
    PacketLost {
        fragment_id: u64,
        retry_count: u64,
    },
    RetrySuccess {
        fragment_id: u64,
        retry_count: u64,
    },
    TransmitComplete {
        total_time_ms: u64,
        retries: u64,
    },
    /// Unrecognised or malformed entry
    Unknown {
        tag: Option<String>,
        payload: Value,
    },
}

/// Coarse kind of an [`Event`], used for tallies and labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    TransmitStart,
    TransmitFragment,
    PacketLost,
    RetrySuccess,
    TransmitComplete,
    Unknown,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::TransmitStart => "START",
            EventKind::TransmitFragment => "FRAGMENT",
            EventKind::PacketLost => "LOST",
            EventKind::RetrySuccess => "RETRY OK",
            EventKind::TransmitComplete => "COMPLETE",
            EventKind::Unknown => "UNKNOWN",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TransmitStart { .. } => EventKind::TransmitStart,
            Event::TransmitFragment { .. } => EventKind::TransmitFragment,
            Event::PacketLost { .. } => EventKind::PacketLost,
            Event::RetrySuccess { .. } => EventKind::RetrySuccess,
            Event::TransmitComplete { .. } => EventKind::TransmitComplete,
            Event::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Classify one raw entry. Never fails.
    pub fn classify(raw: &Value) -> Self {
        let (tag, body) = match split_tag(raw) {
            Some(parts) => parts,
            None => {
                return Event::Unknown {
                    tag: None,
                    payload: raw.clone(),
                }
            }
        };

        let classified = match tag.as_str() {
            "TransmitStart" => fields::<StartFields>(&body).map(|f| Event::TransmitStart {
                from: f.from,
                to: f.to,
                message_type: f.message_type,
                total_bytes: f.total_bytes,
                fragments: f.fragments,
            }),
            "TransmitFragment" => {
                fields::<FragmentFields>(&body).map(|f| Event::TransmitFragment {
                    fragment_id: f.fragment_id,
                    total_fragments: f.total_fragments,
                    bytes: f.bytes,
                })
            }
            "PacketLost" => fields::<RetryFields>(&body).map(|f| Event::PacketLost {
                fragment_id: f.fragment_id,
                retry_count: f.retry_count,
            }),
            "RetrySuccess" => fields::<RetryFields>(&body).map(|f| Event::RetrySuccess {
                fragment_id: f.fragment_id,
                retry_count: f.retry_count,
            }),
            "TransmitComplete" => {
                fields::<CompleteFields>(&body).map(|f| Event::TransmitComplete {
                    total_time_ms: f.total_time_ms,
                    retries: f.retries,
                })
            }
            _ => None,
        };

        classified.unwrap_or_else(|| {
            debug!("Unrecognised event tag {:?}", tag);
            Event::Unknown {
                tag: Some(tag),
                payload: raw.clone(),
            }
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::TransmitStart {
                from,
                to,
                message_type,
                total_bytes,
                fragments,
            } => {
                write!(f, "{} → {} | {}", from, to, message_type)?;
                if let (Some(bytes), Some(fragments)) = (total_bytes, fragments) {
                    write!(f, " | {} bytes in {} fragments", bytes, fragments)?;
                }
                Ok(())
            }
            Event::TransmitFragment {
                fragment_id,
                total_fragments,
                bytes,
            } => write!(f, "{}/{} | {} bytes", fragment_id, total_fragments, bytes),
            Event::PacketLost {
                fragment_id,
                retry_count,
            } => write!(f, "Fragment {} | Retry {}", fragment_id, retry_count),
            Event::RetrySuccess {
                fragment_id,
                retry_count,
            } => write!(f, "Fragment {} | After {} retries", fragment_id, retry_count),
            Event::TransmitComplete {
                total_time_ms,
                retries,
            } => write!(f, "{}ms | {} retries", total_time_ms, retries),
            Event::Unknown { tag, payload } => match tag {
                Some(tag) => write!(f, "Unknown ({}) {}", tag, payload),
                None => write!(f, "Unknown {}", payload),
            },
        }
    }
}

/// A raw entry paired with its classification
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEvent {
    /// 1-based position within the decoded window
    pub position: usize,
    pub raw: Value,
    pub event: Event,
}

/// Classify the newest [`MAX_DECODED_EVENTS`] entries, oldest first.
pub fn decode(events: &[Value]) -> Vec<DisplayEvent> {
    let start = events.len().saturating_sub(MAX_DECODED_EVENTS);
    events[start..]
        .iter()
        .enumerate()
        .map(|(offset, raw)| DisplayEvent {
            position: offset + 1,
            raw: raw.clone(),
            event: Event::classify(raw),
        })
        .collect()
}

/// Per-kind counts over a decoded window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTally {
    pub starts: usize,
    pub fragments: usize,
    pub lost: usize,
    pub recovered: usize,
    pub completed: usize,
    pub unknown: usize,
}

impl EventTally {
    pub fn from_events(events: &[DisplayEvent]) -> Self {
        let mut tally = Self::default();
        for entry in events {
            match entry.event.kind() {
                EventKind::TransmitStart => tally.starts += 1,
                EventKind::TransmitFragment => tally.fragments += 1,
                EventKind::PacketLost => tally.lost += 1,
                EventKind::RetrySuccess => tally.recovered += 1,
                EventKind::TransmitComplete => tally.completed += 1,
                EventKind::Unknown => tally.unknown += 1,
            }
        }
        tally
    }
}

fn split_tag(raw: &Value) -> Option<(String, Value)> {
    let object = raw.as_object()?;

    if let Some(tag) = object.get(TYPE_TAG).and_then(Value::as_str) {
        return Some((tag.to_string(), raw.clone()));
    }

    if object.len() == 1 {
        let (tag, body) = object.iter().next()?;
        if body.is_object() {
            return Some((tag.clone(), body.clone()));
        }
        if body.is_null() {
            return Some((tag.clone(), Value::Object(Map::new())));
        }
    }

    None
}

fn fields<T: DeserializeOwned>(body: &Value) -> Option<T> {
    serde_json::from_value(body.clone()).ok()
}

#[derive(Deserialize)]
#[serde(default)]
struct StartFields {
    from: String,
    to: String,
    message_type: String,
    total_bytes: Option<u64>,
    fragments: Option<u64>,
}

impl Default for StartFields {
    fn default() -> Self {
        Self {
            from: "N/A".to_string(),
            to: "N/A".to_string(),
            message_type: "N/A".to_string(),
            total_bytes: None,
            fragments: None,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FragmentFields {
    fragment_id: u64,
    total_fragments: u64,
    bytes: u64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RetryFields {
    fragment_id: u64,
    retry_count: u64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CompleteFields {
    total_time_ms: u64,
    retries: u64,
}
