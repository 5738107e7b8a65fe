//! Error Types for CORRAL API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use corral_core::{CorralError, FetchError, RateLimitError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::{MIN_RETRY_AFTER_SECS, RETRY_AFTER_HEADER};
use crate::service::LookupError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Server Errors (429, 500, 504)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    /// Internal server error
    InternalError,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create an EntityNotFound error.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::TooManyRequests,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
        .with_details(serde_json::json!({ "retry_after_secs": retry_after_secs }))
    }

    /// Seconds a rate limited client should wait, if this is a rate limit error.
    pub fn retry_after_secs(&self) -> Option<u64> {
        if self.code != ErrorCode::TooManyRequests {
            return None;
        }
        self.details
            .as_ref()
            .and_then(|details| details.get("retry_after_secs"))
            .and_then(|secs| secs.as_u64())
    }
}

/// Round a retry delay up to whole seconds, never below the minimum.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(MIN_RETRY_AFTER_SECS)
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Rate limit errors also carry a `retry-after` header.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs();
        let mut response = (status, Json(self)).into_response();

        if let Some(secs) = retry_after {
            response.headers_mut().insert(
                HeaderName::from_static(RETRY_AFTER_HEADER),
                HeaderValue::from(secs),
            );
        }

        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::RateLimited { retry_after } => {
                ApiError::too_many_requests(retry_after_secs(retry_after))
            }
            LookupError::InvalidClient(err) => err.into(),
            LookupError::InvalidKey(err) => err.into(),
            LookupError::NotFound { id } => ApiError::entity_not_found("User", id),
            LookupError::Internal(err) => err.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::TimedOut { .. } => ApiError::timeout("user lookup"),
            other => {
                // Log the full error, return a generic one.
                tracing::error!(error = %other, "Backing fetch failed");
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// An unidentifiable client is a server-side failure, not a bad request.
impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        tracing::error!(error = %err, "Could not identify client");
        ApiError::internal_error("Could not identify client")
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidValue { field, reason } => {
                ApiError::invalid_input(format!("Invalid {}: {}", field, reason))
            }
        }
    }
}

impl From<CorralError> for ApiError {
    fn from(err: CorralError) -> Self {
        match err {
            CorralError::Fetch(err) => err.into(),
            CorralError::RateLimit(err) => err.into(),
            CorralError::Validation(err) => err.into(),
            other => ApiError::internal_error(other.to_string()),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
