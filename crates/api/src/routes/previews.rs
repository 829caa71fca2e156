//! Serves live image previews of selected files.

use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use gatherly_shared::AppError;
use uuid::Uuid;

use super::app_error_response;
use crate::AppState;

/// Blocks scripts and subresources of anything rendered from a preview.
const PREVIEW_CSP: &str = "default-src 'none'; sandbox";

/// Image types a browser renders without running embedded content.
const RASTER_TYPES: [&str; 7] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/bmp",
    "image/x-icon",
];

/// Creates the preview routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/previews/{id}", get(get_preview))
}

/// GET `/previews/{id}`
///
/// Answers only while the owning widget still holds the preview. Raster
/// images are served inline; other declared image types are attachments.
async fn get_preview(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(entry) = state.previews.get(id) else {
        return app_error_response(&AppError::NotFound(format!("preview {id}")));
    };

    let mime_type = entry.mime_type.to_ascii_lowercase();
    let disposition = if RASTER_TYPES.contains(&mime_type.as_str()) {
        "inline"
    } else {
        "attachment"
    };

    (
        [
            (header::CONTENT_TYPE, entry.mime_type),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CONTENT_SECURITY_POLICY, PREVIEW_CSP.to_string()),
            (header::CONTENT_DISPOSITION, disposition.to_string()),
        ],
        entry.data,
    )
        .into_response()
}
