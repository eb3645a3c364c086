//! JSON response envelope and the error-to-status mapping shared by all
//! gateway endpoints.
//!
//! Every response body has the shape `{"status": bool, "message": ...}` where
//! `message` is either text or a field-to-error object.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::client::ClientError;
use crate::staging::StagingError;
use crate::validation::FieldErrors;

pub const SERVER_BUSY: &str = "server busy";
pub const NOT_REGISTERED: &str = "wa not registered";
pub const INVALID_PHONE_FORMAT: &str = "invalid phone number format";
pub const REQUEST_TIMEOUT: &str = "request timeout";

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EnvelopeMessage {
    Text(String),
    Fields(FieldErrors),
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub status: bool,
    pub message: EnvelopeMessage,
}

/// A successful (or deliberately unsuccessful) envelope with its status code.
#[derive(Debug)]
pub struct ApiResponse {
    code: StatusCode,
    body: Envelope,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OK,
            body: Envelope {
                status: true,
                message: EnvelopeMessage::Text(message.into()),
            },
        }
    }

    fn failure(code: StatusCode, message: EnvelopeMessage) -> Self {
        Self {
            code,
            body: Envelope {
                status: false,
                message,
            },
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self.body)).into_response()
    }
}

/// Everything a gateway handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed")]
    Validation(FieldErrors),

    #[error("invalid phone number format")]
    InvalidPhoneNumber,

    #[error("destination is not registered")]
    NotRegistered,

    #[error("messaging client error: {0}")]
    Client(#[from] ClientError),

    #[error("attachment staging error: {0}")]
    Staging(#[from] StagingError),

    /// The request body could not be read (too large, aborted).
    #[error("request body rejected: {message}")]
    Body { status: StatusCode, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidPhoneNumber => StatusCode::BAD_REQUEST,
            ApiError::NotRegistered => StatusCode::NOT_FOUND,
            ApiError::Body { status, .. } => *status,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Client(_) | ApiError::Staging(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let message = match self {
            ApiError::Validation(fields) => EnvelopeMessage::Fields(fields),
            ApiError::InvalidPhoneNumber => EnvelopeMessage::Text(INVALID_PHONE_FORMAT.to_string()),
            ApiError::NotRegistered => EnvelopeMessage::Text(NOT_REGISTERED.to_string()),
            ApiError::Body { message, .. } => EnvelopeMessage::Text(message),
            ApiError::Timeout => EnvelopeMessage::Text(REQUEST_TIMEOUT.to_string()),
            internal => {
                // Details stay in the log; clients only get the generic message
                error!(error = %internal, "Request failed");
                EnvelopeMessage::Text(SERVER_BUSY.to_string())
            }
        };
        ApiResponse::failure(code, message).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
