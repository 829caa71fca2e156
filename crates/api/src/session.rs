//! Form sessions: one mounted upload field of the registration form.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use gatherly_core::upload::{Rejection, RejectionReason, SelectedFile, UploadOutcome};
use gatherly_core::{
    AnyBackend, CoordinatorState, FileStatus, FileUploadWidget, UploadCoordinator, UploadListener,
    UploadPhase,
};
use gatherly_shared::{AppError, AppResult};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Logs coordinator callbacks of one session.
struct SessionListener {
    session_id: Uuid,
}

impl UploadListener for SessionListener {
    fn on_upload_start(&self, file_count: usize) {
        info!(session_id = %self.session_id, file_count, "Upload started");
    }

    fn on_upload_complete(&self, outcomes: &[UploadOutcome]) {
        let demo = outcomes.iter().filter(|o| o.demo).count();
        info!(
            session_id = %self.session_id,
            files = outcomes.len(),
            demo,
            "Upload complete"
        );
    }

    fn on_upload_error(&self, message: &str) {
        warn!(session_id = %self.session_id, error = message, "Upload finished with failures");
    }
}

/// A widget paired with the coordinator that uploads its files.
pub struct FormSession {
    id: Uuid,
    widget: Mutex<FileUploadWidget>,
    coordinator: UploadCoordinator<AnyBackend>,
    last_touched: std::sync::Mutex<Instant>,
}

impl FormSession {
    /// Pair a widget with a backend. The coordinator uses the widget's destination.
    #[must_use]
    pub fn new(id: Uuid, widget: FileUploadWidget, backend: AnyBackend, strict_mode: bool) -> Self {
        let coordinator = UploadCoordinator::new(backend, widget.destination().clone())
            .with_strict_mode(strict_mode)
            .with_listener(Arc::new(SessionListener { session_id: id }));

        Self {
            id,
            widget: Mutex::new(widget),
            coordinator,
            last_touched: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Time since the session was last used.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Whether a batch of this session is still outstanding.
    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.coordinator.state().uploading
    }

    fn touch(&self) {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Apply a drop and, when uploading is enabled, submit the accepted files.
    ///
    /// The selection is updated before the upload starts, so a failed
    /// upload never undoes the drop. The widget is not locked while the
    /// batch is in flight; it stays readable and rejects edits until the
    /// outcomes are recorded. The batch runs on its own task and settles
    /// even if the caller goes away.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload task panicked.
    pub async fn drop_files(self: &Arc<Self>, files: Vec<SelectedFile>) -> AppResult<DropResponse> {
        self.touch();
        let (report, batch) = {
            let mut widget = self.widget.lock().await;
            let report = widget.drop_files(files);
            let batch = if report.changed() {
                widget.take_pending()
            } else {
                Vec::new()
            };
            (report, batch)
        };

        let outcomes = if batch.is_empty() {
            Vec::new()
        } else {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                let outcomes = session.coordinator.upload_many(&batch).await;
                session
                    .widget
                    .lock()
                    .await
                    .record_outcomes(&batch, &outcomes);
                session.touch();
                outcomes
            })
            .await
            .map_err(|e| AppError::Internal(format!("upload task failed: {e}")))?
        };

        let widget = self.widget.lock().await;
        Ok(DropResponse {
            accepted: report.accepted.len(),
            ignored: report.ignored,
            rejections: report.rejections.iter().map(RejectionView::from).collect(),
            outcomes,
            session: self.view_of(&widget),
        })
    }

    /// Remove the file at `index`. Returns whether anything was removed.
    pub async fn remove(&self, index: usize) -> (bool, SessionView) {
        self.touch();
        let mut widget = self.widget.lock().await;
        let removed = widget.remove(index);
        (removed, self.view_of(&widget))
    }

    /// Current view of the session.
    pub async fn view(&self) -> SessionView {
        self.touch();
        let widget = self.widget.lock().await;
        self.view_of(&widget)
    }

    fn view_of(&self, widget: &FileUploadWidget) -> SessionView {
        let CoordinatorState {
            phase,
            uploading,
            progress_percent,
            outcomes,
        } = self.coordinator.state();

        SessionView {
            id: self.id,
            hint: widget.hint(),
            upload_enabled: widget.upload_enabled(),
            interactive: widget.is_interactive(),
            demo_mode: self.coordinator.is_demo_mode(),
            files: widget
                .selection()
                .iter()
                .enumerate()
                .map(|(index, file)| FileView {
                    index,
                    name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    size: file.size,
                    preview_url: widget.preview_url(index).unwrap_or_default().to_string(),
                    status: widget.status(index),
                })
                .collect(),
            phase,
            uploading,
            progress_percent,
            outcomes,
        }
    }
}

/// One selected file as shown in the preview grid.
#[derive(Debug, Serialize)]
pub struct FileView {
    /// Position in the selection.
    pub index: usize,
    /// Original file name.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Preview URL, empty for non-images.
    pub preview_url: String,
    /// Upload badge state, absent when uploading is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
}

/// Session state returned by every session route.
#[derive(Debug, Serialize)]
pub struct SessionView {
    /// Session id.
    pub id: Uuid,
    /// Helper text under the drop target.
    pub hint: String,
    /// Whether accepted files are uploaded.
    pub upload_enabled: bool,
    /// Whether drops and removals are accepted right now.
    pub interactive: bool,
    /// Whether the backend runs in demo mode.
    pub demo_mode: bool,
    /// Current selection.
    pub files: Vec<FileView>,
    /// Coordinator phase.
    pub phase: UploadPhase,
    /// Whether a batch is outstanding.
    pub uploading: bool,
    /// 0 or 100.
    pub progress_percent: u8,
    /// Every outcome so far.
    pub outcomes: Vec<UploadOutcome>,
}

/// A rejected file with its display message.
#[derive(Debug, Serialize)]
pub struct RejectionView {
    /// Name of the rejected file.
    pub file_name: String,
    /// Inline error text.
    pub message: String,
    /// Structured reasons.
    pub reasons: Vec<RejectionReason>,
}

impl From<&Rejection> for RejectionView {
    fn from(rejection: &Rejection) -> Self {
        Self {
            file_name: rejection.file_name.clone(),
            message: rejection.message(),
            reasons: rejection.reasons.clone(),
        }
    }
}

/// Result of a drop.
#[derive(Debug, Serialize)]
pub struct DropResponse {
    /// Number of files added to the selection.
    pub accepted: usize,
    /// The drop arrived while the widget was not interactive.
    pub ignored: bool,
    /// Files left out.
    pub rejections: Vec<RejectionView>,
    /// Outcomes of the batch submitted for this drop.
    pub outcomes: Vec<UploadOutcome>,
    /// Session state after the drop.
    pub session: SessionView,
}
