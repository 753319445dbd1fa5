//! Event records for the append-only lifecycle log.

use chrono::{DateTime, Utc};
use gleaner_core::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Structured key/value detail attached to an event.
pub type EventPayload = BTreeMap<String, String>;

/// Builds an event payload from key/value pairs.
pub fn event_payload<K, V, const N: usize>(pairs: [(K, V); N]) -> EventPayload
where
    K: Into<String>,
    V: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Lifecycle event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A new job was created for a unique submission.
    Discover,
    /// A resolver is being invoked for a job.
    Process,
    /// The job resolved successfully. Terminal.
    Complete,
    /// A resolver attempt (or the whole job) failed.
    Fail,
    /// A resolver was skipped because its circuit breaker was open.
    Skip,
    /// A retry is scheduled, or an expired lease returned a job to pending.
    Retry,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Discover => write!(f, "DISCOVER"),
            EventType::Process => write!(f, "PROCESS"),
            EventType::Complete => write!(f, "COMPLETE"),
            EventType::Fail => write!(f, "FAIL"),
            EventType::Skip => write!(f, "SKIP"),
            EventType::Retry => write!(f, "RETRY"),
        }
    }
}

/// One record in the append-only event log.
///
/// Immutable once written. The log is the only entity with a strict total
/// order: by `sequence`, a monotonic counter assigned at append time
/// (timestamps are informational and may tie).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic global sequence number.
    pub sequence: u64,

    /// When the event was appended.
    pub timestamp: DateTime<Utc>,

    /// Event type.
    pub event_type: EventType,

    /// Job the event belongs to.
    pub job_id: JobId,

    /// Resolver involved, when applicable.
    pub resolver_name: Option<String>,

    /// Structured detail.
    #[serde(default)]
    pub payload: EventPayload,
}

impl EventRecord {
    /// Convenience accessor for a payload value.
    pub fn payload_get(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    /// Returns true if this FAIL event marks the job terminal (as opposed
    /// to a single resolver giving up).
    pub fn is_terminal_failure(&self) -> bool {
        self.event_type == EventType::Fail && self.payload_get("terminal") == Some("true")
    }
}
