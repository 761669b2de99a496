//! Serial session state, events and commands
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::serial::SerialError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Why an open session went back to Closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// `stop()` was requested
    Stopped,
    /// A read failed or the device hung up
    IoError(String),
    /// The owning bridge was torn down
    Shutdown,
}

/// Read-only view of the session for display layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub port: Option<String>,
    pub session_id: Option<Uuid>,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_close: Option<CloseReason>,
}

impl SessionSnapshot {
    pub fn closed(last_close: Option<CloseReason>) -> Self {
        Self {
            state: ConnectionState::Closed,
            port: None,
            session_id: None,
            opened_at: None,
            last_close,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::closed(None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryLine {
    pub session_id: Uuid,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Everything the session reports outward, in the order it happened.
///
/// Every event carries the id of the session that produced it so a consumer
/// can ignore stragglers from a session it already considers closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Opened { session_id: Uuid, port: String },
    Line(TelemetryLine),
    Closed { session_id: Uuid, port: String, reason: CloseReason },
}

impl SessionEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::Opened { session_id, .. } | SessionEvent::Closed { session_id, .. } => *session_id,
            SessionEvent::Line(line) => line.session_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub sessions_opened: u64,
    pub bytes_read: u64,
    pub lines_read: u64,
    pub utf8_decode_errors: u64,
    pub oversized_lines: u64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum SessionCommand {
    Start {
        port: String,
        responder: oneshot::Sender<Result<SessionSnapshot, SerialError>>,
    },
    /// Replies `true` when an open session was closed
    Stop {
        responder: oneshot::Sender<Result<bool, SerialError>>,
    },
    Shutdown,
}
