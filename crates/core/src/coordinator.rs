//! Upload coordinator: batch state and degradation policy over one backend.
//!
//! State machine per coordinator:
//!
//! ```text
//! Idle ──upload_many──▶ Uploading ──all outcomes resolved──▶ Settled
//!                          ▲                                   │
//!                          └───────────upload_many─────────────┘
//! ```
//!
//! Progress is a coarse two-state signal: 0 while any batch is outstanding,
//! 100 once every batch has settled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::UploadBackend;
use crate::upload::{SelectedFile, UploadDestination, UploadOutcome};

/// Callbacks of the hosting form.
///
/// `on_upload_complete` fires exactly once per batch. `on_upload_error`
/// fires at most once per batch, when at least one file failed.
pub trait UploadListener: Send + Sync {
    /// A live batch is about to start.
    fn on_upload_start(&self, _file_count: usize) {}

    /// A batch settled.
    fn on_upload_complete(&self, _outcomes: &[UploadOutcome]) {}

    /// A batch settled with failures.
    fn on_upload_error(&self, _message: &str) {}
}

/// Coordinator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// No batch submitted yet.
    Idle,
    /// At least one batch outstanding.
    Uploading,
    /// Every submitted batch has resolved.
    Settled,
}

/// Read-only snapshot of coordinator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorState {
    /// Lifecycle phase.
    pub phase: UploadPhase,
    /// Whether any batch is outstanding.
    pub uploading: bool,
    /// 0 or 100.
    pub progress_percent: u8,
    /// Every outcome produced so far, in batch and submission order.
    pub outcomes: Vec<UploadOutcome>,
}

#[derive(Debug, Default)]
struct Inner {
    started: bool,
    in_flight: usize,
    progress_percent: u8,
    outcomes: Vec<UploadOutcome>,
}

/// Mediates between the widget's selection and an upload backend.
pub struct UploadCoordinator<B: UploadBackend> {
    backend: B,
    destination: UploadDestination,
    strict_mode: bool,
    listener: Option<Arc<dyn UploadListener>>,
    inner: Mutex<Inner>,
}

impl<B: UploadBackend> UploadCoordinator<B> {
    /// Create a coordinator for one destination.
    #[must_use]
    pub fn new(backend: B, destination: UploadDestination) -> Self {
        Self {
            backend,
            destination,
            strict_mode: false,
            listener: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Surface credential failures instead of substituting demo outcomes.
    #[must_use]
    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    /// Attach hosting-form callbacks.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn UploadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Destination of every upload.
    #[must_use]
    pub fn destination(&self) -> &UploadDestination {
        &self.destination
    }

    /// Whether the backend runs in demo mode.
    #[must_use]
    pub fn is_demo_mode(&self) -> bool {
        !self.backend.is_configured()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        let inner = self.lock();
        CoordinatorState {
            phase: if inner.in_flight > 0 {
                UploadPhase::Uploading
            } else if inner.started {
                UploadPhase::Settled
            } else {
                UploadPhase::Idle
            },
            uploading: inner.in_flight > 0,
            progress_percent: inner.progress_percent,
            outcomes: inner.outcomes.clone(),
        }
    }

    /// Upload one file.
    pub async fn upload_one(&self, file: &SelectedFile) -> UploadOutcome {
        self.upload_many(std::slice::from_ref(file))
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| UploadOutcome::failed(&file.name, "no outcome produced"))
    }

    /// Upload a batch concurrently. Outcomes keep submission order.
    ///
    /// An unconfigured backend yields demo outcomes without any network call.
    pub async fn upload_many(&self, files: &[SelectedFile]) -> Vec<UploadOutcome> {
        if files.is_empty() {
            return Vec::new();
        }

        if !self.backend.is_configured() {
            let outcomes: Vec<UploadOutcome> = files
                .iter()
                .map(|file| self.backend.demo_outcome(file, &self.destination))
                .collect();
            warn!(
                backend = %self.backend.kind(),
                files = files.len(),
                "Upload provider not configured, returning demo outcomes"
            );
            self.begin_batch();
            self.finish_batch(&outcomes);
            return outcomes;
        }

        self.begin_batch();
        if let Some(listener) = &self.listener {
            listener.on_upload_start(files.len());
        }
        info!(backend = %self.backend.kind(), files = files.len(), "Uploading batch");

        let outcomes = join_all(files.iter().map(|file| self.upload_file(file))).await;

        self.finish_batch(&outcomes);
        outcomes
    }

    async fn upload_file(&self, file: &SelectedFile) -> UploadOutcome {
        match self.backend.put(file, &self.destination).await {
            Ok(object) => UploadOutcome::uploaded(&file.name, object),
            Err(e) if !self.strict_mode && e.is_credential_related() => {
                let outcome = self.backend.demo_outcome(file, &self.destination);
                warn!(
                    backend = %self.backend.kind(),
                    file_name = %file.name,
                    error = %e,
                    url = outcome.url.as_deref().unwrap_or_default(),
                    "Credential failure masked with demo outcome"
                );
                outcome
            }
            Err(e) => {
                warn!(backend = %self.backend.kind(), file_name = %file.name, error = %e, "Upload failed");
                UploadOutcome::failed(&file.name, e.to_string())
            }
        }
    }

    fn begin_batch(&self) {
        let mut inner = self.lock();
        inner.started = true;
        inner.in_flight += 1;
        inner.progress_percent = 0;
    }

    fn finish_batch(&self, outcomes: &[UploadOutcome]) {
        {
            let mut inner = self.lock();
            inner.outcomes.extend_from_slice(outcomes);
            inner.in_flight = inner.in_flight.saturating_sub(1);
            if inner.in_flight == 0 {
                inner.progress_percent = 100;
            }
        }

        let Some(listener) = &self.listener else {
            return;
        };

        let failures: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.error.as_deref().unwrap_or("Upload failed"))
            .collect();
        if !failures.is_empty() {
            listener.on_upload_error(&format!(
                "Failed to upload {} files: {}",
                failures.len(),
                failures.join(", ")
            ));
        }
        listener.on_upload_complete(outcomes);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
