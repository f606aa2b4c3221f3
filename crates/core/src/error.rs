//! Core error types shared by every sessionflow crate.
//!
//! Errors are explicit and typed. Components that absorb store failures
//! (the lock manager, the event bus, the queue) still produce these values
//! internally so the log line carries a structured reason.

use thiserror::Error;

/// Core error type for sessionflow operations.
#[derive(Debug, Error)]
pub enum Error {
    // Store errors
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("key '{key}' holds a value of the wrong kind")]
    WrongType { key: String },

    // Parsing errors
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    // Generic errors
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Create a store-unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a wrong-type error for a key.
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// The standard Result type for sessionflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for absorbing errors at component boundaries.
pub trait ResultExt<T> {
    /// Convert to an Option, logging the error under `context` if present.
    fn into_option_logged(self, context: &str) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "{context}");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_convert_to_serialization() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_into_option_logged_drops_errors() {
        let ok: Result<u8> = Ok(3);
        let bad: Result<u8> = Err(Error::unavailable("x"));
        assert_eq!(ok.into_option_logged("ctx"), Some(3));
        assert_eq!(bad.into_option_logged("ctx"), None);
    }
}
