//! Error types and handling
//!
//! This module provides the error handling framework for the gateway.
//! All locally-resolved failures are converted to a consistent JSON response
//! format; downstream failures are surfaced as 502/504 without leaking any
//! internal detail to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// No route matched the request path (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized - missing, invalid, or expired credential (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden - missing tenant claim or role policy not satisfied (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Destination cluster unreachable (502)
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Destination cluster timed out (504)
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error response
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, should_log) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", false),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", true),
            AppError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway", true),
            AppError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout", true),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", true),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", true),
        };

        // Log server-side errors
        if should_log {
            error!(error = %self, error_type = error_type, "Request error");
        }

        let body = ErrorResponse::new(error_type, self.to_string());

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
