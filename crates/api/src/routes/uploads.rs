//! Provider status and bucket maintenance routes.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use gatherly_core::ProviderStatus;
use gatherly_core::backend::S3Config;
use gatherly_core::upload::ObjectMetadata;
use gatherly_shared::AppError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{app_error_response, upload_app_error};
use crate::AppState;

const DEFAULT_MAX_KEYS: usize = 100;
const MAX_KEYS_LIMIT: usize = 1000;

/// Creates the upload routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/uploads/status", get(provider_status))
        .route("/uploads/s3/objects", get(list_objects))
        .route(
            "/uploads/s3/objects/{bucket}/{*key}",
            get(presign_object).delete(delete_object),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Configured/demo flags of every provider.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// One entry per backend kind.
    pub providers: Vec<ProviderStatus>,
    /// Whether credential failures are surfaced instead of degraded.
    pub strict_mode: bool,
}

/// Query of an object listing.
#[derive(Debug, Deserialize)]
pub struct ListObjectsQuery {
    /// Bucket, defaults to the configured bucket.
    pub bucket: Option<String>,
    /// Key prefix.
    pub prefix: Option<String>,
    /// Maximum number of entries.
    pub max_keys: Option<usize>,
}

/// Object listing.
#[derive(Debug, Serialize)]
pub struct ListObjectsResponse {
    /// Bucket that was listed.
    pub bucket: String,
    /// Listed objects.
    pub objects: Vec<ObjectMetadata>,
}

/// Query of a signed download URL.
#[derive(Debug, Deserialize)]
pub struct PresignQuery {
    /// Lifetime of the URL in seconds.
    pub expires_in: Option<u64>,
}

/// Signed download URL for a private object.
#[derive(Debug, Serialize)]
pub struct PresignResponse {
    /// Signed URL.
    pub url: String,
    /// Lifetime of the URL in seconds.
    pub expires_in: u64,
}

/// Result of a delete.
#[derive(Debug, Serialize)]
pub struct DeleteObjectResponse {
    /// Whether the object was deleted.
    pub deleted: bool,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET `/uploads/status`
async fn provider_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        providers: state.providers.statuses(),
        strict_mode: state.providers.strict_mode(),
    })
}

/// GET `/uploads/s3/objects`
async fn list_objects(
    State(state): State<AppState>,
    Query(query): Query<ListObjectsQuery>,
) -> impl IntoResponse {
    let s3 = state.providers.s3();

    let bucket = query
        .bucket
        .filter(|b| !b.is_empty())
        .or_else(|| s3.config().and_then(|c| c.bucket.clone()));
    let Some(bucket) = bucket else {
        return app_error_response(&AppError::Validation("bucket is required".to_string()));
    };
    let max_keys = query
        .max_keys
        .unwrap_or(DEFAULT_MAX_KEYS)
        .clamp(1, MAX_KEYS_LIMIT);

    match s3
        .list_objects(&bucket, query.prefix.as_deref(), max_keys)
        .await
    {
        Ok(objects) => {
            info!(bucket = %bucket, count = objects.len(), "Objects listed");
            (StatusCode::OK, Json(ListObjectsResponse { bucket, objects })).into_response()
        }
        Err(e) => {
            error!(bucket = %bucket, error = %e, "Failed to list objects");
            app_error_response(&upload_app_error(e))
        }
    }
}

/// GET `/uploads/s3/objects/{bucket}/{*key}`
async fn presign_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<PresignQuery>,
) -> impl IntoResponse {
    let ttl = query
        .expires_in
        .map_or(S3Config::DEFAULT_PRESIGN_TTL, Duration::from_secs);

    match state.providers.s3().presign_read(&bucket, &key, ttl).await {
        Ok(url) => (
            StatusCode::OK,
            Json(PresignResponse {
                url,
                expires_in: ttl.as_secs(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(bucket = %bucket, key = %key, error = %e, "Failed to sign download URL");
            app_error_response(&upload_app_error(e))
        }
    }
}

/// DELETE `/uploads/s3/objects/{bucket}/{*key}`
async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> impl IntoResponse {
    let s3 = state.providers.s3();
    if s3.config().is_none() {
        return app_error_response(&AppError::NotConfigured(
            "S3-compatible storage is not configured".to_string(),
        ));
    }

    let deleted = s3.delete_object(&bucket, &key).await;
    (StatusCode::OK, Json(DeleteObjectResponse { deleted })).into_response()
}
