//! API error types and response handling.
//!
//! Every handler returns [`ApiResult`]; errors render as an [`ErrorResponse`]
//! with the status code matching the failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use drivesafe_core::DriveSafeError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - invalid input from the client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_inbound_message",
    "message": "Invalid inbound message: sender is required",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "invalid_inbound_message")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Invalid inbound message: sender is required")]
    pub message: String,

    /// Optional additional details.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status this error renders with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_parts(self) -> (String, String) {
        match self {
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::InternalError {
                error_code,
                message,
            } => (error_code, message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = self.into_parts();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_code = %error_code,
                message = %message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            error: error_code,
            message,
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<DriveSafeError> for ApiError {
    fn from(err: DriveSafeError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        // Handlers only surface input errors; anything else is a server fault.
        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (
                DriveSafeError::InvalidInboundMessage("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DriveSafeError::InvalidSensorSource("udp://x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DriveSafeError::DetectionWorkerPanicked("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                DriveSafeError::ConfigValidationError("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_error_code_is_lowercase() {
        let err = ApiError::from(DriveSafeError::InvalidInboundMessage("x".into()));
        let (code, _) = err.into_parts();
        assert_eq!(code, "invalid_inbound_message");
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }
}
