//! API route definitions.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatherly_core::upload::UploadError;
use gatherly_shared::AppError;
use serde_json::json;

use crate::AppState;

pub mod health;
pub mod previews;
pub mod sessions;
pub mod uploads;

/// Creates the API router with all routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(uploads::routes())
        .merge(sessions::routes())
        .merge(previews::routes())
}

/// JSON error body in the `{ "error", "message" }` shape used by every route.
pub(crate) fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "message": message.into()
        })),
    )
        .into_response()
}

/// Render an application error.
pub(crate) fn app_error_response(err: &AppError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, &err.error_code().to_ascii_lowercase(), err.to_string())
}

/// Map a storage failure onto the application error taxonomy.
pub(crate) fn upload_app_error(err: UploadError) -> AppError {
    match err {
        UploadError::NotConfigured => AppError::NotConfigured(err.to_string()),
        UploadError::MissingBucket => AppError::Validation(err.to_string()),
        other => AppError::ExternalService(other.to_string()),
    }
}
