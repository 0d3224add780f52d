//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`reelvault_core::Error`] (via a wrapper)
//! so route handlers can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError(reelvault_core::Error);

impl From<reelvault_core::Error> for AppError {
    fn from(e: reelvault_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.0,
                "Server error in API handler"
            );
        }

        let code = match &self.0 {
            reelvault_core::Error::NotFound { .. } => "not_found",
            reelvault_core::Error::RangeNotSatisfiable(_) => "range_not_satisfiable",
            reelvault_core::Error::Validation(_) => "validation_error",
            reelvault_core::Error::Tool { .. } => "tool_error",
            reelvault_core::Error::EngineUnavailable(_) => "engine_unavailable",
            reelvault_core::Error::Probe(_) => "probe_error",
            reelvault_core::Error::Io { .. } => "io_error",
            reelvault_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::from(reelvault_core::Error::not_found("video", "clip.mp4"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_range_produces_416() {
        let err = AppError::from(reelvault_core::Error::bad_range("nope"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn engine_unavailable_produces_503() {
        let err = AppError::from(reelvault_core::Error::EngineUnavailable("off".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
