//! Form session routes: create a widget, drop files, remove, tear down.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use gatherly_core::FileUploadWidget;
use gatherly_core::upload::{AcceptanceConstraints, SelectedFile, UploadDestination};
use gatherly_shared::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{app_error_response, error_response};
use crate::AppState;
use crate::session::{FormSession, SessionView};

/// Creates the session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}", delete(close_session))
        .route("/sessions/{id}/files", post(drop_files))
        .route("/sessions/{id}/files/{index}", delete(remove_file))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for opening a form session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Where accepted files are uploaded.
    #[serde(default)]
    pub destination: UploadDestination,
    /// Upload accepted files right after each drop.
    #[serde(default = "default_upload_enabled")]
    pub upload_enabled: bool,
    /// Overrides the configured file count limit.
    #[serde(default)]
    pub max_files: Option<usize>,
    /// Overrides the configured per-file size limit.
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
    /// Overrides the configured accepted types.
    #[serde(default)]
    pub accepted_types: Option<BTreeMap<String, Vec<String>>>,
}

fn default_upload_enabled() -> bool {
    true
}

/// Response for a removal.
#[derive(Debug, Serialize)]
pub struct RemoveFileResponse {
    /// Whether a file was removed.
    pub removed: bool,
    /// Session state after the removal.
    pub session: SessionView,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn find_session(state: &AppState, id: Uuid) -> AppResult<Arc<FormSession>> {
    state
        .sessions
        .get(&id)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))
}

/// Collect every file part of a multipart drop. Parts without a file name are skipped.
async fn read_files(mut multipart: Multipart) -> Result<Vec<SelectedFile>, Response> {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(error_response(e.status(), "invalid_multipart", e.body_text())),
        };

        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| error_response(e.status(), "invalid_multipart", e.body_text()))?;

        debug!(file_name = %name, mime_type = %mime_type, size = data.len(), "File part received");
        files.push(SelectedFile::new(name, mime_type, data));
    }

    Ok(files)
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/sessions`
async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Response {
    let settings = &state.settings;
    let constraints = match AcceptanceConstraints::new(
        payload.max_files.unwrap_or(settings.max_files),
        payload.max_size_bytes.unwrap_or(settings.max_file_size),
        payload
            .accepted_types
            .unwrap_or_else(|| settings.accepted_types.clone()),
    ) {
        Ok(constraints) => constraints,
        Err(e) => return app_error_response(&AppError::Validation(e.to_string())),
    };

    let id = Uuid::new_v4();
    let kind = payload.destination.backend_kind;
    let widget = FileUploadWidget::new(
        constraints,
        payload.destination,
        payload.upload_enabled,
        state.previews.clone(),
    );
    let session = Arc::new(FormSession::new(
        id,
        widget,
        state.providers.backend(kind),
        state.providers.strict_mode(),
    ));

    let view = session.view().await;
    state.sessions.insert(id, session);
    info!(session_id = %id, backend = %kind, "Form session opened");

    (StatusCode::CREATED, Json(view)).into_response()
}

/// GET `/sessions/{id}`
async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match find_session(&state, id) {
        Ok(session) => Json(session.view().await).into_response(),
        Err(e) => app_error_response(&e),
    }
}

/// POST `/sessions/{id}/files`
///
/// Applies a drop. With uploading enabled the accepted files are submitted
/// before the response is sent; other requests on the session are served
/// meanwhile.
async fn drop_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Response {
    let session = match find_session(&state, id) {
        Ok(session) => session,
        Err(e) => return app_error_response(&e),
    };
    let files = match read_files(multipart).await {
        Ok(files) => files,
        Err(response) => return response,
    };

    match session.drop_files(files).await {
        Ok(response) => {
            info!(
                session_id = %id,
                accepted = response.accepted,
                rejected = response.rejections.len(),
                uploaded = response.outcomes.len(),
                ignored = response.ignored,
                "Files dropped"
            );
            Json(response).into_response()
        }
        Err(e) => {
            error!(session_id = %id, error = %e, "Failed to apply drop");
            app_error_response(&e)
        }
    }
}

/// DELETE `/sessions/{id}/files/{index}`
async fn remove_file(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Response {
    let session = match find_session(&state, id) {
        Ok(session) => session,
        Err(e) => return app_error_response(&e),
    };

    let (removed, session) = session.remove(index).await;
    Json(RemoveFileResponse { removed, session }).into_response()
}

/// DELETE `/sessions/{id}`
///
/// Dropping the session releases every preview it still holds.
async fn close_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.sessions.remove(&id) {
        Some(_) => {
            info!(session_id = %id, "Form session closed");
            StatusCode::NO_CONTENT.into_response()
        }
        None => app_error_response(&AppError::NotFound(format!("session {id}"))),
    }
}
