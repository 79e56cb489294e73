use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use strum::Display;

/// Unique connection identifier assigned when a connection is accepted or
/// established.
pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh connection id. Ids are never reused within a process.
pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Why a connection's receive loop stopped.
///
/// Best-effort, for logging and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The stream ended cleanly, possibly in the middle of a frame.
    Eof,
    /// Reading failed (reset, timeout, oversized frame).
    ReceiveFailed(String),
    /// The receive loop panicked.
    Fault(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Eof => f.write_str("eof"),
            DisconnectReason::ReceiveFailed(e) => write!(f, "receive failed: {e}"),
            DisconnectReason::Fault(e) => write!(f, "fault: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventKind {
    Connected,
    Data,
    Disconnected,
}

/// Inbound events produced by the network layer.
///
/// For every connection exactly one `Connected` is emitted first and exactly
/// one `Disconnected` last, with its `Data` events in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected {
        conn_id: ConnId,
    },

    Data {
        conn_id: ConnId,
        payload: Bytes,
    },

    Disconnected {
        conn_id: ConnId,
        reason: DisconnectReason,
    },
}

impl Event {
    pub fn conn_id(&self) -> ConnId {
        match self {
            Event::Connected { conn_id }
            | Event::Data { conn_id, .. }
            | Event::Disconnected { conn_id, .. } => *conn_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected { .. } => EventKind::Connected,
            Event::Data { .. } => EventKind::Data,
            Event::Disconnected { .. } => EventKind::Disconnected,
        }
    }

    /// Payload of a `Data` event.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Event::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
