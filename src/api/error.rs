//! HTTP mapping for [`AppError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::AppError;

/// Response wrapper turning an [`AppError`] into `{ "error": … }`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::Precondition(_) => StatusCode::CONFLICT,
            AppError::Denied(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidInput(_) | AppError::PathViolation(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Db(_)
            | AppError::Rcon(_)
            | AppError::Process(_)
            | AppError::Backup(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(err = %self.0, "request failed");
        }
        (
            status,
            Json(ApiErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
