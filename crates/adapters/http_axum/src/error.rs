//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use greenhouse_domain::error::{GreenhouseError, UnavailableError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`GreenhouseError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(GreenhouseError);

impl From<GreenhouseError> for ApiError {
    fn from(err: GreenhouseError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl From<UnavailableError> for ApiError {
    fn from(err: UnavailableError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            GreenhouseError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            GreenhouseError::Resolution(err) => (StatusCode::NOT_FOUND, err.to_string()),
            GreenhouseError::Unavailable(err) => {
                tracing::warn!(error = %err, "request refused, signal backend unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            GreenhouseError::Hardware(err) => {
                tracing::error!(error = %err, "hardware error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            GreenhouseError::Configuration(err) => {
                tracing::error!(error = %err, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
