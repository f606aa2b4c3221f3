//! Session lifecycle events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sessionflow_core::SessionId;

/// Node name for events about the whole run rather than one step.
pub const ALL_NODES: &str = "ALL";

/// Lifecycle stage an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Start,
    Complete,
    Error,
}

impl EventStatus {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
        }
    }
}

/// A lifecycle notification. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub node: String,
    pub status: EventStatus,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Map<String, Value>>,
}

impl SessionEvent {
    fn now(session_id: SessionId, node: impl Into<String>, status: EventStatus) -> Self {
        Self {
            session_id,
            node: node.into(),
            status,
            timestamp: Utc::now().timestamp_millis(),
            error: None,
            summary: None,
        }
    }

    /// A node started.
    pub fn start(session_id: SessionId, node: impl Into<String>) -> Self {
        Self::now(session_id, node, EventStatus::Start)
    }

    /// A node finished, optionally with a summary of what it produced.
    pub fn complete(
        session_id: SessionId,
        node: impl Into<String>,
        summary: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            summary,
            ..Self::now(session_id, node, EventStatus::Complete)
        }
    }

    /// A node failed.
    pub fn error(
        session_id: SessionId,
        node: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::now(session_id, node, EventStatus::Error)
        }
    }
}
