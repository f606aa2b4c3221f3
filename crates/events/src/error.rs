//! Error types for the events crate.

use std::fmt;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Subscribing to the channel failed.
    SubscriptionFailed { channel: String, reason: String },
    /// Channel closed.
    ChannelClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriptionFailed { channel, reason } => {
                write!(f, "subscription to '{channel}' failed: {reason}")
            }
            Self::ChannelClosed => {
                write!(f, "event channel closed")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a subscription failed error.
    pub fn subscription_failed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
