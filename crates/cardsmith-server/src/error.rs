//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cardsmith_domain::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource is in use by another request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload is not a supported document type.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Upload exceeds the configured ceiling.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Request was understood but its content cannot be processed.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Upstream generation backend failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServerError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::SessionNotFound(id) => {
                ServerError::NotFound(format!("Session '{}' not found or expired", id))
            }
            DomainError::SessionBusy(id) => ServerError::Conflict(format!(
                "Flashcards are already being generated for session '{}'",
                id
            )),
            DomainError::Capacity(capacity) => ServerError::ServiceUnavailable(format!(
                "Upload store is full ({} sessions); try again later",
                capacity
            )),
            DomainError::InvalidSessionId(id) => {
                ServerError::BadRequest(format!("Invalid session id '{}'", id))
            }
            DomainError::Extraction(msg) => ServerError::Unprocessable(msg),
            DomainError::Generation(msg) => ServerError::Upstream(msg),
            DomainError::Internal(msg) => ServerError::Internal(msg),
        }
    }
}

impl From<cardsmith_session::Error> for ServerError {
    fn from(e: cardsmith_session::Error) -> Self {
        DomainError::from(e).into()
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ServerError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ServerError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
            }
            ServerError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ServerError::Unprocessable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed")
            }
            ServerError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ServerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_status() {
        let cases = [
            (DomainError::SessionNotFound("a".into()), StatusCode::NOT_FOUND),
            (DomainError::SessionBusy("a".into()), StatusCode::CONFLICT),
            (DomainError::Capacity(2), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::InvalidSessionId("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::Extraction("bad".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::Generation("down".into()), StatusCode::BAD_GATEWAY),
        ];

        for (domain, expected) in cases {
            let (status, _) = ServerError::from(domain).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ServerError::NotFound("Session 'abc' not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "not_found");
        assert!(error.message.contains("abc"));
    }
}
