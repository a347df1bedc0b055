//! Error types for rigchat
//!
//! Backend and configuration failures are `AppError`s. Classification policy
//! downgrades are not errors from the user's perspective: the router resolves
//! them internally and only the enforcer itself reports them as
//! `ClassificationBlocked` so the caller knows to downgrade.

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("{backend} is not reachable at {url}: {reason}")]
    BackendUnavailable {
        backend: String,
        url: String,
        reason: String,
    },

    #[error("Model '{model}' not found on {backend}")]
    ModelNotFound { backend: String, model: String },

    #[error("Request to {backend} timed out after {timeout_seconds} seconds")]
    Timeout {
        backend: String,
        timeout_seconds: u64,
    },

    #[error("Stream from {backend} interrupted after {chunks_received} chunks: {reason}")]
    StreamInterrupted {
        backend: String,
        chunks_received: usize,
        reason: String,
    },

    #[error(
        "AC-4: classification level blocks cloud routing: {level} data cannot be sent to {tier} tier"
    )]
    ClassificationBlocked { level: String, tier: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the session should react to an error
///
/// Timeouts are folded into `BackendUnavailable`: both mean "the backend did
/// not answer, try again or try the other tier".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BackendUnavailable,
    ModelNotFound,
    PolicyViolation,
    Cancelled,
    Internal,
}

impl AppError {
    /// Classify this error for recovery handling
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendUnavailable { .. }
            | Self::Timeout { .. }
            | Self::StreamInterrupted { .. } => ErrorKind::BackendUnavailable,
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::ClassificationBlocked { .. } => ErrorKind::PolicyViolation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for errors the user can recover from by retrying or switching tier
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BackendUnavailable | ErrorKind::ModelNotFound
        )
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_classification_blocked_message_names_level_and_tier() {
        let err = AppError::ClassificationBlocked {
            level: "SECRET".to_string(),
            tier: "Opus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "AC-4: classification level blocks cloud routing: SECRET data cannot be sent to Opus tier"
        );
        assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    }

    #[test]
    fn test_timeout_is_treated_as_backend_unavailable() {
        let err = AppError::Timeout {
            backend: "ollama".to_string(),
            timeout_seconds: 120,
        };
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_model_not_found_is_recoverable() {
        let err = AppError::ModelNotFound {
            backend: "ollama".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancelled_is_not_recoverable() {
        assert_eq!(AppError::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(!AppError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_internal_error_creates() {
        let err = AppError::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
