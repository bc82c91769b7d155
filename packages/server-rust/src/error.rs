//! HTTP error mapping.
//!
//! Every error body carries the request id so callers can correlate it with
//! server logs. Business and unclassified failures are logged in full and
//! answered with a fixed message.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqctx_core::context;
use tracing::{error, warn};

use crate::network::handlers::dto::{epoch_millis, ErrorResponse, ValidationErrorResponse, ABSENT};
use crate::service::executor::ExecutorError;

pub const VALIDATION_FAILED: &str = "Validation failed";
pub const BUSINESS_FAILURE: &str = "An error occurred during processing";
pub const UNEXPECTED_FAILURE: &str = "An unexpected error occurred";

/// Failure of a request handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input, keyed by field.
    #[error("validation failed: {errors:?}")]
    Validation { errors: BTreeMap<String, String> },
    /// A business operation failed.
    #[error(transparent)]
    Business(#[from] anyhow::Error),
    /// Anything else, including handler panics.
    #[error("unexpected failure: {0}")]
    Unclassified(String),
}

impl ApiError {
    /// Validation failure of a single field.
    #[must_use]
    pub fn field(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            errors: BTreeMap::from([(field.to_string(), reason.into())]),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Business(_) | Self::Unclassified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ExecutorError> for ApiError {
    fn from(e: ExecutorError) -> Self {
        Self::Business(e.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::field("body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = context::request_id().unwrap_or_else(|| ABSENT.to_string());
        let timestamp = epoch_millis();

        match self {
            Self::Validation { errors } => {
                warn!(?errors, "Validation error occurred");
                let body = ValidationErrorResponse {
                    message: VALIDATION_FAILED.to_string(),
                    errors,
                    request_id,
                    timestamp,
                    status: status.as_u16(),
                };
                (status, Json(body)).into_response()
            }
            Self::Business(e) => {
                error!(error = %format!("{e:#}"), "Business processing failed");
                error_body(status, BUSINESS_FAILURE, request_id, timestamp)
            }
            Self::Unclassified(detail) => {
                error!(error = %detail, "Unexpected failure");
                error_body(status, UNEXPECTED_FAILURE, request_id, timestamp)
            }
        }
    }
}

fn error_body(status: StatusCode, message: &str, request_id: String, timestamp: u64) -> Response {
    let body = ErrorResponse {
        message: message.to_string(),
        request_id,
        timestamp,
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use reqctx_core::{keys, ContextGuard, ContextMap};

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn with_request_id() -> ContextGuard {
        ContextGuard::install(ContextMap::from([(
            keys::REQUEST_ID.to_string(),
            "req-1".to_string(),
        )]))
    }

    #[tokio::test]
    async fn validation_maps_to_400_with_fields() {
        let response = {
            let _guard = with_request_id();
            ApiError::field("data", "Data cannot be blank").into_response()
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["message"], VALIDATION_FAILED);
        assert_eq!(json["errors"]["data"], "Data cannot be blank");
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["status"], 400);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn business_failure_hides_detail() {
        let response = {
            let _guard = with_request_id();
            ApiError::from(anyhow::anyhow!("database password is hunter2")).into_response()
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["message"], BUSINESS_FAILURE);
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["status"], 500);
        assert!(!json.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn unclassified_without_context_uses_absent_marker() {
        let response = {
            let _guard = ContextGuard::empty();
            ApiError::Unclassified("boom".to_string()).into_response()
        };
        let json = body_json(response).await;
        assert_eq!(json["message"], UNEXPECTED_FAILURE);
        assert_eq!(json["requestId"], ABSENT);
    }

    #[test]
    fn executor_errors_are_business_failures() {
        let error = ApiError::from(ExecutorError::Shutdown);
        assert!(matches!(error, ApiError::Business(_)));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
