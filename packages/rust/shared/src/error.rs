//! Error types for JobPilot.
//!
//! Library crates use [`JobPilotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Variants are grouped by how the run reacts to them:
//! - transient UI failures are retried a bounded number of times, then the job is skipped
//! - [`JobPilotError::AuthChallengeRequired`] and fatal session errors halt the run
//! - everything else is a setup/collaborator failure surfaced to the caller

use std::path::PathBuf;

use crate::types::FailureReason;

/// Top-level error type for all JobPilot operations.
#[derive(Debug, thiserror::Error)]
pub enum JobPilotError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Document parsing or selector error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An expected element was not present (or not interactable) in the document.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// A bounded browser operation did not complete in time.
    #[error("timed out after {after_ms}ms: {operation}")]
    Timeout { operation: String, after_ms: u64 },

    /// The application form reported a validation problem.
    #[error("form validation failed: {message}")]
    FormValidation { message: String },

    /// The flow left the host platform (e.g. an external apply page).
    #[error("unexpected redirect to {url}")]
    UnexpectedRedirect { url: String },

    /// The site interposed a secondary verification step; needs a human.
    #[error("authentication challenge at {url}; resolve it manually and resume")]
    AuthChallengeRequired { url: String },

    /// The automation session is unusable.
    #[error("fatal session error: {0}")]
    FatalSession(String),

    /// A session operation was attempted in the wrong lifecycle state.
    #[error("invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobPilotError>;

/// Coarse classification used by the orchestrator to decide how far an error escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bounded retry, then skip the job.
    TransientUi,
    /// Halt the run; a human has to resolve the challenge.
    AuthChallenge,
    /// Abort the run and release the session.
    FatalSession,
    /// Setup or collaborator failure.
    Environment,
}

impl JobPilotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms: after.as_millis() as u64,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ElementNotFound { .. }
            | Self::Timeout { .. }
            | Self::FormValidation { .. }
            | Self::UnexpectedRedirect { .. } => ErrorCategory::TransientUi,
            Self::AuthChallengeRequired { .. } => ErrorCategory::AuthChallenge,
            Self::FatalSession(_) | Self::InvalidState { .. } => ErrorCategory::FatalSession,
            _ => ErrorCategory::Environment,
        }
    }

    /// Whether another try of the same step could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. } | Self::Timeout { .. } | Self::FormValidation { .. }
        )
    }

    /// Whether this error must stop the whole run rather than just the current job.
    pub fn halts_run(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::AuthChallenge | ErrorCategory::FatalSession
        )
    }

    /// The per-attempt failure reason this error maps to, if it is a UI failure.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::ElementNotFound { .. } => Some(FailureReason::ElementNotFound),
            Self::Timeout { .. } => Some(FailureReason::Timeout),
            Self::FormValidation { .. } => Some(FailureReason::ValidationError),
            Self::UnexpectedRedirect { .. } => Some(FailureReason::UnexpectedRedirect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = JobPilotError::config("missing daily limit");
        assert_eq!(err.to_string(), "config error: missing daily limit");

        let err = JobPilotError::timeout("click", std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timed out after 1500ms: click");
    }

    #[test]
    fn classification() {
        let transient = JobPilotError::element_not_found("button.apply");
        assert_eq!(transient.category(), ErrorCategory::TransientUi);
        assert!(transient.is_retryable());
        assert!(!transient.halts_run());
        assert_eq!(
            transient.failure_reason(),
            Some(FailureReason::ElementNotFound)
        );

        let redirect = JobPilotError::UnexpectedRedirect {
            url: "https://elsewhere.example/apply".into(),
        };
        assert!(!redirect.is_retryable());
        assert_eq!(
            redirect.failure_reason(),
            Some(FailureReason::UnexpectedRedirect)
        );

        let challenge = JobPilotError::AuthChallengeRequired {
            url: "https://jobs.example/checkpoint".into(),
        };
        assert!(challenge.halts_run());
        assert_eq!(challenge.failure_reason(), None);

        assert!(JobPilotError::FatalSession("gone".into()).halts_run());
        assert!(!JobPilotError::Storage("locked".into()).halts_run());
    }
}
