//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes hosting upload widgets as form sessions
//! - Preview serving for selected images
//! - Provider status and bucket maintenance routes

pub mod routes;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::map_response;
use axum::response::Response;
use dashmap::DashMap;
use gatherly_core::{PreviewStore, UploadProviders};
use gatherly_shared::{AppError, UploadSettings};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::session::FormSession;

/// Path prefix under which previews are served.
pub const PREVIEW_BASE_URL: &str = "/api/v1/previews";

/// Largest accepted request body. Per-file limits are enforced by the widget.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// How often idle form sessions are looked for.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upload backends resolved from configuration.
    pub providers: UploadProviders,
    /// Live image previews.
    pub previews: PreviewStore,
    /// Open form sessions.
    pub sessions: Arc<DashMap<Uuid, Arc<FormSession>>>,
    /// Upload defaults for new sessions.
    pub settings: Arc<UploadSettings>,
}

impl AppState {
    /// Build state from upload settings.
    #[must_use]
    pub fn new(settings: UploadSettings) -> Self {
        Self::with_providers(UploadProviders::from_settings(&settings), settings)
    }

    /// Build state around already resolved providers.
    #[must_use]
    pub fn with_providers(providers: UploadProviders, settings: UploadSettings) -> Self {
        Self {
            providers,
            previews: PreviewStore::new(PREVIEW_BASE_URL),
            sessions: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    /// Close sessions untouched for at least `max_idle`. Sessions with a
    /// batch outstanding are kept. Returns how many were closed.
    ///
    /// Closing a session drops its widget, which revokes its previews.
    pub fn sweep_idle_sessions(&self, max_idle: Duration) -> usize {
        let mut closed = 0;
        self.sessions.retain(|id, session| {
            let keep = session.is_uploading() || session.idle_for() < max_idle;
            if !keep {
                info!(session_id = %id, "Idle form session closed");
                closed += 1;
            }
            keep
        });
        closed
    }
}

/// Periodically close form sessions idle longer than the configured limit.
pub fn spawn_session_sweeper(state: AppState) -> JoinHandle<()> {
    let max_idle = Duration::from_secs(state.settings.session_idle_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            state.sweep_idle_sessions(max_idle);
        }
    })
}

/// Give bare 413 responses (e.g. from the body limit layer) the JSON error shape.
async fn payload_too_large_body(response: Response) -> Response {
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return response;
    }
    routes::app_error_response(&AppError::PayloadTooLarge(format!(
        "request body exceeds {MAX_REQUEST_BYTES} bytes"
    )))
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(map_response(payload_too_large_body))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
