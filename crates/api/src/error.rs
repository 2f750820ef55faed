//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::chat::{IngestError, SubscribeError};
use crate::store::StoreError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),

    // Internal errors
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingSession(_) => ApiError::NotFound,
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable => ApiError::ServiceUnavailable,
            StoreError::Database(_) | StoreError::Corrupt(_) => {
                tracing::error!(error = %err, "Storage error");
                ApiError::ServiceUnavailable
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(e) => ApiError::Validation(e.to_string()),
            IngestError::MissingSessionId => ApiError::BadRequest(err.to_string()),
            IngestError::UnknownSession(_) => ApiError::NotFound,
            IngestError::SessionClosed(_) => ApiError::Conflict(err.to_string()),
            IngestError::Unauthorized(_) | IngestError::Forbidden(_) => ApiError::Forbidden,
            IngestError::UnsupportedRole(_) => ApiError::BadRequest(err.to_string()),
            IngestError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure during ingest");
                ApiError::ServiceUnavailable
            }
        }
    }
}

impl From<SubscribeError> for ApiError {
    fn from(err: SubscribeError) -> Self {
        match err {
            SubscribeError::Validation(e) => ApiError::Validation(e.to_string()),
            SubscribeError::UnknownSession(_) => ApiError::NotFound,
            SubscribeError::Unauthorized(_) | SubscribeError::Forbidden(_) => ApiError::Forbidden,
            SubscribeError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpline_shared::{SessionId, ValidationError};

    #[test]
    fn test_ingest_error_status_mapping() {
        let cases = [
            (IngestError::Validation(ValidationError::EmptyBody), StatusCode::BAD_REQUEST),
            (IngestError::UnknownSession(SessionId::new()), StatusCode::NOT_FOUND),
            (IngestError::SessionClosed(SessionId::new()), StatusCode::CONFLICT),
            (IngestError::Unauthorized(SessionId::new()), StatusCode::FORBIDDEN),
            (IngestError::Storage(StoreError::Unavailable), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_storage_failures_are_retryable_503s() {
        let err = IngestError::Storage(StoreError::Database("connection reset".into()));
        assert!(err.is_retryable());
        assert_eq!(
            ApiError::from(err).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
