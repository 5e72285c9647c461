//! API error types.

use crate::catalog::SourceError;
use crate::gate::GateError;
use crate::ratelimit::RateLimitError;
use crate::renderer::RenderError;
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use vitrine_storage::StorageError;

/// Seconds suggested to clients when preview storage is full.
const STORAGE_FULL_RETRY_AFTER_SECS: u64 = 30;

/// Seconds suggested to clients when the scrape queue is full.
const QUEUE_FULL_RETRY_AFTER_SECS: u64 = 5;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("too many scrape jobs in flight")]
    TooManyJobs,

    #[error("request aborted before completion")]
    Aborted,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Core(#[from] vitrine_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::TooManyJobs => "too_many_jobs",
            Self::Aborted => "aborted",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "not_found",
                StorageError::CapacityExceeded { .. } => "artifact_too_large",
                StorageError::TemporarilyFull => "storage_full",
                StorageError::Aborted => "aborted",
                _ => "storage_error",
            },
            Self::RateLimited(_) => "rate_limit_exceeded",
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooManyJobs => StatusCode::SERVICE_UNAVAILABLE,
            Self::Aborted => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                StorageError::TemporarilyFull => StatusCode::SERVICE_UNAVAILABLE,
                StorageError::Aborted => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Seconds to advertise in `Retry-After`, for transient conditions.
    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::TooManyJobs => Some(QUEUE_FULL_RETRY_AFTER_SECS),
            Self::Storage(StorageError::TemporarilyFull) => Some(STORAGE_FULL_RETRY_AFTER_SECS),
            _ => None,
        }
    }

    /// Message safe to show to clients. Faults keep their details in the log.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            Self::Storage(e) if e.is_fault() => "preview storage is unavailable".to_string(),
            Self::Storage(StorageError::NotFound(_)) => "preview not found".to_string(),
            Self::Storage(StorageError::Aborted) => Self::Aborted.to_string(),
            Self::Storage(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::RateLimited(e) => return e.into_response(),
            Self::Internal(ref detail) => {
                tracing::error!(error = %detail, "internal error");
            }
            Self::Storage(ref e) if e.is_fault() => {
                tracing::error!(error = %e, "preview storage fault");
            }
            _ => {}
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        match self.retry_after_secs() {
            Some(secs) => (
                status,
                [(header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response(),
            None => (status, Json(body)).into_response(),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::QueueFull => Self::TooManyJobs,
            GateError::Aborted => Self::Aborted,
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unsupported => Self::BadRequest(err.to_string()),
            SourceError::Aborted => Self::Aborted,
            SourceError::Upstream(detail) => Self::Upstream(detail),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Aborted => Self::Aborted,
            RenderError::Failed(detail) => Self::Upstream(detail),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mapping() {
        let too_large = ApiError::from(StorageError::CapacityExceeded {
            size: 10,
            max_bytes: 5,
        });
        assert_eq!(too_large.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(too_large.code(), "artifact_too_large");
        assert_eq!(too_large.retry_after_secs(), None);

        let full = ApiError::from(StorageError::TemporarilyFull);
        assert_eq!(full.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(full.code(), "storage_full");
        assert!(full.retry_after_secs().is_some());

        let aborted = ApiError::from(StorageError::Aborted);
        assert_eq!(aborted.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_storage_fault_hides_details() {
        let err = ApiError::from(StorageError::Io(std::io::Error::other(
            "/var/lib/vitrine/previews: disk full",
        )));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "storage_error");
        assert!(!err.public_message().contains("/var/lib"));
    }

    #[test]
    fn test_gate_mapping() {
        let full = ApiError::from(GateError::QueueFull);
        assert_eq!(full.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(full.code(), "too_many_jobs");

        let response = full.into_response();
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        assert_eq!(
            ApiError::from(GateError::Aborted).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
