//! Notifier errors.

use thiserror::Error;

/// Why a notification was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification request failed: {reason}")]
    Request { reason: String },

    #[error("notifier misconfigured: {reason}")]
    Config { reason: String },

    #[error("notification endpoint rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl NotifyError {
    pub fn request(reason: impl Into<String>) -> Self {
        Self::Request {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::request(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
