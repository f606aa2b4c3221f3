//! Error types for the workflow crate.

use std::fmt;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// What went wrong inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    /// A step returned an error or flagged one in its state update.
    StepFailed,
    /// A step exceeded its time budget.
    StepTimeout,
    /// The graph names a step that is not registered.
    StepNotFound,
    /// The graph itself is malformed: unknown nodes, a cycle, no entry.
    InvalidGraph,
}

impl EngineErrorKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StepFailed => "step_failed",
            Self::StepTimeout => "step_timeout",
            Self::StepNotFound => "step_not_found",
            Self::InvalidGraph => "invalid_graph",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged engine failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    kind: EngineErrorKind,
    step: Option<String>,
    message: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "step '{step}' {}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Create an error of the given kind.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            step: None,
            message: message.into(),
        }
    }

    /// Create a step failed error.
    pub fn step_failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::StepFailed, reason).at_step(step)
    }

    /// Create a step timeout error.
    pub fn step_timeout(step: impl Into<String>, timeout_secs: u64) -> Self {
        Self::new(
            EngineErrorKind::StepTimeout,
            format!("timed out after {timeout_secs}s"),
        )
        .at_step(step)
    }

    /// Create a step not found error.
    pub fn step_not_found(step: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::StepNotFound, "no step registered").at_step(step)
    }

    /// Create an invalid graph error.
    pub fn invalid_graph(reason: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidGraph, reason)
    }

    /// Attach the step the error came from.
    #[must_use]
    pub fn at_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether running the step again might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::StepFailed | EngineErrorKind::StepTimeout
        )
    }
}

/// Failure reported by a step implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    message: String,
}

impl StepError {
    /// Create a step error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_step() {
        let err = EngineError::step_failed("coder", "sandbox crashed");
        assert_eq!(err.to_string(), "step 'coder' step_failed: sandbox crashed");
        assert_eq!(err.step(), Some("coder"));
    }

    #[test]
    fn test_display_without_step() {
        let err = EngineError::invalid_graph("cycle through 'a'");
        assert_eq!(err.to_string(), "invalid_graph: cycle through 'a'");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(EngineError::step_timeout("s", 5).is_retryable());
        assert!(!EngineError::step_not_found("s").is_retryable());
        assert!(!EngineError::invalid_graph("x").is_retryable());
    }
}
