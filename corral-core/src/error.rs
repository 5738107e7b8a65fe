//! Error types for CORRAL operations

use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Work queue errors.
///
/// These are delivered only to the caller that submitted the task; sibling
/// tasks and the queue itself keep running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Task panicked: {message}")]
    TaskPanicked { message: String },

    #[error("Task did not complete within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("Work queue is shut down")]
    Closed,
}

/// Backing fetch errors.
///
/// Cloneable because one failure is handed to every caller coalesced onto
/// the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Backing fetch failed: {reason}")]
    Backend { reason: String },

    #[error("Fetch did not settle within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("Fetch was abandoned before it settled")]
    Abandoned,

    #[error("Work queue error: {0}")]
    Queue(#[from] QueueError),
}

impl FetchError {
    /// Convenience constructor for loader failures.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Rate limiter errors.
///
/// A denial is not an error; only a precondition violation lands here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Invalid client identifier: {reason}")]
    InvalidClient { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all CORRAL errors.
#[derive(Debug, Clone, Error)]
pub enum CorralError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for CORRAL operations.
pub type CorralResult<T> = Result<T, CorralError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "capacity".to_string(),
            value: "0".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("capacity"));
        assert!(msg.contains("0"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn test_fetch_error_wraps_queue_error() {
        let err = FetchError::from(QueueError::TaskPanicked {
            message: "boom".to_string(),
        });
        assert!(matches!(err, FetchError::Queue(QueueError::TaskPanicked { .. })));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_fetch_error_backend_constructor() {
        let err = FetchError::backend("connection reset");
        assert_eq!(
            err,
            FetchError::Backend {
                reason: "connection reset".to_string()
            }
        );
    }

    #[test]
    fn test_corral_error_from_variants() {
        let config = CorralError::from(ConfigError::InvalidValue {
            field: "ttl".to_string(),
            value: "-1".to_string(),
            reason: "not a number".to_string(),
        });
        assert!(matches!(config, CorralError::Config(_)));

        let queue = CorralError::from(QueueError::Closed);
        assert!(matches!(queue, CorralError::Queue(_)));

        let fetch = CorralError::from(FetchError::Abandoned);
        assert!(matches!(fetch, CorralError::Fetch(_)));

        let rate = CorralError::from(RateLimitError::InvalidClient {
            reason: "empty".to_string(),
        });
        assert!(matches!(rate, CorralError::RateLimit(_)));

        let validation = CorralError::from(ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: "not a number".to_string(),
        });
        assert!(matches!(validation, CorralError::Validation(_)));
    }
}
