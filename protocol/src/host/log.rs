//! Event log.
//!
//! Contracts emit events through [`Frame::emit`](super::Frame::emit). Each
//! event is serialized to JSON and appended to the host's log together with
//! the emitting address and the transaction it belongs to. Logs emitted by a
//! call that later reverts are removed with the rest of its effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::identity::Identity;

/// Identifier of one top-level transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(Uuid);

impl TxId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event type that can be written to the log.
pub trait LogEvent: Serialize {
    /// Event name, e.g. `"BatchCompleted"`.
    fn topic(&self) -> &'static str;
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Transaction that emitted the event.
    pub tx: TxId,
    /// Contract that emitted the event.
    pub emitter: Identity,
    /// Event name.
    pub topic: String,
    /// Serialized event body.
    pub data: serde_json::Value,
    /// Wall-clock time of emission.
    pub recorded_at: DateTime<Utc>,
}
