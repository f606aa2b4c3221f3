//! Coordinator error types.

use sessionflow_core::{SessionId, SessionState};
use sessionflow_workflow::EngineError;
use thiserror::Error;

/// Message recorded when a run is submitted without a topic.
pub const MISSING_TOPIC: &str = "missing 'topic'; cannot continue";

/// Why a coordinated run did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// Another run holds the session lock.
    #[error("session '{session_id}' is already running; retry later")]
    Busy { session_id: SessionId },

    /// The merged state cannot be executed.
    #[error("{reason}")]
    Validation {
        session_id: SessionId,
        reason: String,
    },

    /// The engine reported a failure.
    #[error("{error}")]
    Engine {
        session_id: SessionId,
        error: EngineError,
    },
}

impl CoordinatorError {
    /// Create a busy error.
    #[must_use]
    pub const fn busy(session_id: SessionId) -> Self {
        Self::Busy { session_id }
    }

    /// Create a validation error.
    pub fn validation(session_id: SessionId, reason: impl Into<String>) -> Self {
        Self::Validation {
            session_id,
            reason: reason.into(),
        }
    }

    /// Create an engine error.
    #[must_use]
    pub const fn engine(session_id: SessionId, error: EngineError) -> Self {
        Self::Engine { session_id, error }
    }

    /// The session the failure belongs to.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        match self {
            Self::Busy { session_id }
            | Self::Validation { session_id, .. }
            | Self::Engine { session_id, .. } => session_id,
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "busy",
            Self::Validation { .. } => "validation",
            Self::Engine { .. } => "engine_error",
        }
    }

    /// The structured `{ _session_id, error }` response clients receive.
    #[must_use]
    pub fn to_state(&self) -> SessionState {
        SessionState::error_response(self.session_id().clone(), self.to_string())
    }
}
