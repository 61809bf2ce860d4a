//! API error types and response handling.
//!
//! Handlers return [`ApiResult`]; core errors convert into [`ApiError`]
//! and render as a JSON [`ErrorResponse`] with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beacon_core::BeaconError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 404 Not Found.
    #[error("Not Found: {message}")]
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 422 Unprocessable Entity - the request conflicts with configuration.
    #[error("Unprocessable Entity: {message}")]
    Unprocessable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error.
    #[error("Internal Error: {message}")]
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - session storage or radio not usable.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "STORAGE_UNAVAILABLE",
    "message": "Session log unavailable: /home/pi/Downloads/beacon: permission denied",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "STORAGE_UNAVAILABLE")]
    pub error: String,

    /// Human-readable error message.
    pub message: String,

    /// Optional additional details.
    #[schema(nullable)]
    pub details: Option<String>,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::NotFound {
                error_code,
                message,
            }
            | Self::Unprocessable {
                error_code,
                message,
            } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::InternalError {
                error_code,
                message,
            } => {
                tracing::error!(error_code = %error_code, message = %message, "Internal server error");
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                }
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => ErrorResponse {
                error: error_code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<BeaconError> for ApiError {
    fn from(err: BeaconError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        match err {
            BeaconError::StorageUnavailable(_) | BeaconError::RadioCommunication(_) => {
                Self::ServiceUnavailable {
                    error_code,
                    message,
                    details: None,
                }
            }
            BeaconError::ConfigNotFound(_) => Self::NotFound {
                error_code,
                message,
            },
            BeaconError::ConfigParseError(_) | BeaconError::ConfigValidationError(_) => {
                Self::Unprocessable {
                    error_code,
                    message,
                }
            }
            BeaconError::WriteFailure(_) | BeaconError::IoError(_) => Self::InternalError {
                error_code,
                message,
            },
        }
    }
}
