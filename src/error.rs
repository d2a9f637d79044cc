//! Error types shared by the provider adapters and the HTTP gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure kinds produced behind the adapter boundary.
///
/// Provider-specific errors (reqwest, serde, HTTP status codes) are folded into
/// one of these before they leave `vision` or `music`.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Invalid upstream output: {0}")]
    InvalidUpstreamOutput(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::ServiceUnavailable(_) => "service_unavailable",
            ServiceError::EmptyResponse(_) => "empty_response",
            ServiceError::InvalidUpstreamOutput(_) => "invalid_upstream_output",
            ServiceError::Upstream(_) => "upstream_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::ServiceUnavailable(_)
            | ServiceError::EmptyResponse(_)
            | ServiceError::InvalidUpstreamOutput(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Error returned by the HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_input",
            message: msg.into(),
        }
    }

    pub fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind: "invalid_input",
            message: msg.into(),
        }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: "invalid_input",
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self {
            status: err.status_code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
