//! Error types for Geotech Q&A services
//!
//! Provides a single error taxonomy shared by every crate:
//! - Distinct error types for validation, timeout, dependency and internal failures
//! - Caller-visible categories and HTTP status code mapping
//! - Structured error responses carrying the request trace id

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::TraceId;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    Timeout,
    DependencyUnavailable,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::RateLimited => 6001,

            ErrorCode::Timeout => 8001,
            ErrorCode::DependencyUnavailable => 8002,
            ErrorCode::UpstreamError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Caller-visible failure category, used by the API layer to pick a status code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input; never retried
    ClientError,
    /// A deadline elapsed before an answer could be produced
    Timeout,
    /// Synthesis or tooling exhausted its retries
    ServiceUnavailable,
    /// Unexpected defect
    ServerError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // External service errors
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{service} unavailable: {message}")]
    DependencyUnavailable { service: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation failure naming the offending field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Shorthand for an unreachable or failing dependency
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::DependencyUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::DependencyUnavailable { .. } => ErrorCode::DependencyUnavailable,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Caller-visible category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. }
            | AppError::InvalidFormat { .. }
            | AppError::RateLimited { .. } => ErrorKind::ClientError,

            AppError::Timeout { .. } => ErrorKind::Timeout,

            AppError::DependencyUnavailable { .. } | AppError::HttpClient(_) => {
                ErrorKind::ServiceUnavailable
            }

            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => ErrorKind::ServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 503 Service Unavailable
            AppError::DependencyUnavailable { .. } | AppError::HttpClient(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a remote call that failed this way may be resubmitted
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Timeout { .. }
                | AppError::DependencyUnavailable { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// An error paired with the trace id of the request that produced it
#[derive(Error, Debug)]
#[error("[{trace_id}] {error}")]
pub struct TracedError {
    pub trace_id: TraceId,
    #[source]
    pub error: AppError,
}

impl TracedError {
    pub fn new(trace_id: TraceId, error: AppError) -> Self {
        Self { trace_id, error }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn error_response(error: &AppError, request_id: Option<String>) -> Response {
    let status = error.status_code();
    let code = error.code();
    let message = error.to_string();

    // Log based on severity
    if error.is_server_error() {
        tracing::error!(
            error = %message,
            code = ?code,
            status = status.as_u16(),
            request_id = request_id.as_deref().unwrap_or("-"),
            "Server error"
        );
    } else if error.is_client_error() {
        tracing::warn!(
            error = %message,
            code = ?code,
            status = status.as_u16(),
            request_id = request_id.as_deref().unwrap_or("-"),
            "Client error"
        );
    }

    let details = match error {
        AppError::Validation {
            field: Some(field), ..
        } => Some(serde_json::json!({ "field": field })),
        _ => None,
    };

    let body = ErrorResponse {
        error: ErrorDetails {
            code,
            kind: error.kind(),
            message,
            details,
            request_id,
        },
    };

    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(&self, None)
    }
}

impl IntoResponse for TracedError {
    fn into_response(self) -> Response {
        error_response(&self.error, Some(self.trace_id.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
