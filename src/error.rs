//! Error types for the bridge
//!
//! Every error leaves the service as an OpenAI-style body:
//! `{"error": {"message", "type", "param": null, "code"}}`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::NormalizeError;

/// Value of the `WWW-Authenticate` header sent with every 401
pub const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"API Access\"";

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidAuthHeader,

    #[error("Invalid API key")]
    InvalidAuthKey,

    #[error("Invalid JSON in request body: {0}")]
    InvalidJson(String),

    #[error("Invalid messages: {0}")]
    InvalidMessages(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status, OpenAI error `type` and `code` for this error
    pub fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::MissingAuthHeader => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_auth_header",
            ),
            AppError::InvalidAuthHeader => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_auth_header",
            ),
            AppError::InvalidAuthKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_auth_key",
            ),
            AppError::InvalidJson(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_json",
            ),
            AppError::InvalidMessages(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_messages",
            ),
            AppError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "invalid_request_error",
                "payload_too_large",
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
            ),
            AppError::Upstream(_) | AppError::Http(_) | AppError::Stream(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                "upstream_error",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal_error",
            ),
        }
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::InvalidMessages(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details, matching OpenAI's error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: &str, code: &str) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.to_string(),
                param: None,
                code: code.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.parts();

        // Internal details stay in the logs
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response =
            (status, Json(ErrorResponse::new(message, error_type, code))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
            );
        }

        response
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
