//! File upload widget: selection list, constraint checks and previews.
//!
//! Dropping files is split in two phases. [`FileUploadWidget::drop_files`]
//! updates the selection synchronously and queues the newly accepted files;
//! [`FileUploadWidget::submit`] (or `take_pending` + `record_outcomes`) sends
//! the queued files through a coordinator. Local state therefore reflects a
//! drop even when the upload later fails.

mod preview;
mod selection;

use std::collections::HashMap;
use std::mem;

use serde::Serialize;
use tracing::debug;

use crate::backend::UploadBackend;
use crate::coordinator::UploadCoordinator;
use crate::upload::{
    AcceptanceConstraints, FileId, Rejection, RejectionReason, SelectedFile, UploadBadge,
    UploadDestination, UploadOutcome, format_file_size,
};

pub use preview::{PreviewEntry, PreviewHandle, PreviewStore};
pub use selection::{SelectionPlan, plan_selection};

/// Upload status of one selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Waiting to be submitted.
    Ready,
    /// Submitted, outcome pending.
    Uploading,
    /// Stored (or demo-substituted).
    Uploaded,
    /// Upload failed.
    Failed,
}

/// What a drop did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    /// Files added to the selection, in drop order.
    pub accepted: Vec<FileId>,
    /// Files left out, each with its reasons.
    pub rejections: Vec<Rejection>,
    /// The widget was not interactive and ignored the drop.
    pub ignored: bool,
}

impl DropReport {
    /// Whether the selection changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.accepted.is_empty()
    }
}

type ChangeCallback = Box<dyn FnMut(&[SelectedFile]) + Send>;

/// One file field of the hosting form.
pub struct FileUploadWidget {
    constraints: AcceptanceConstraints,
    destination: UploadDestination,
    upload_enabled: bool,
    disabled: bool,
    selection: Vec<SelectedFile>,
    // Parallel to `selection`: one slot per file, `None` for non-images.
    previews: Vec<Option<PreviewHandle>>,
    pending: Vec<FileId>,
    statuses: HashMap<FileId, FileStatus>,
    preview_store: PreviewStore,
    on_change: Option<ChangeCallback>,
}

impl FileUploadWidget {
    /// Create an empty widget.
    #[must_use]
    pub fn new(
        constraints: AcceptanceConstraints,
        destination: UploadDestination,
        upload_enabled: bool,
        preview_store: PreviewStore,
    ) -> Self {
        Self {
            constraints,
            destination,
            upload_enabled,
            disabled: false,
            selection: Vec::new(),
            previews: Vec::new(),
            pending: Vec::new(),
            statuses: HashMap::new(),
            preview_store,
            on_change: None,
        }
    }

    /// Start from an existing selection, e.g. a form value restored on reload.
    ///
    /// The initial files are not queued for upload.
    #[must_use]
    pub fn with_selection(mut self, files: Vec<SelectedFile>) -> Self {
        let plan = plan_selection(&[], files, self.constraints.max_files());
        self.previews = plan.next.iter().map(|f| self.preview_for(f)).collect();
        self.selection = plan.next;
        self
    }

    /// Start disabled: drops and removals are ignored until re-enabled.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Enable or disable the drop target and the remove buttons.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Whether any submitted file is still waiting for its outcome.
    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.statuses.values().any(|s| *s == FileStatus::Uploading)
    }

    /// Whether drops and removals are accepted: not disabled and not uploading.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        !self.disabled && !self.is_uploading()
    }

    /// Called with the new selection whenever it changes.
    #[must_use]
    pub fn on_change(mut self, callback: impl FnMut(&[SelectedFile]) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> &[SelectedFile] {
        &self.selection
    }

    /// Constraints of this widget.
    #[must_use]
    pub fn constraints(&self) -> &AcceptanceConstraints {
        &self.constraints
    }

    /// Destination of uploads.
    #[must_use]
    pub fn destination(&self) -> &UploadDestination {
        &self.destination
    }

    /// Whether accepted files are queued for upload.
    #[must_use]
    pub fn upload_enabled(&self) -> bool {
        self.upload_enabled
    }

    /// Preview URL at an index: empty for non-images, `None` out of range.
    #[must_use]
    pub fn preview_url(&self, index: usize) -> Option<&str> {
        self.previews
            .get(index)
            .map(|slot| slot.as_ref().map_or("", PreviewHandle::url))
    }

    /// Upload status at an index. `None` when uploading is disabled or out of range.
    #[must_use]
    pub fn status(&self, index: usize) -> Option<FileStatus> {
        if !self.upload_enabled {
            return None;
        }
        let file = self.selection.get(index)?;
        Some(
            self.statuses
                .get(&file.id())
                .copied()
                .unwrap_or(FileStatus::Ready),
        )
    }

    /// Helper text shown under the drop target.
    #[must_use]
    pub fn hint(&self) -> String {
        let max_size = format_file_size(self.constraints.max_size_bytes());
        if self.constraints.is_single() {
            format!("Single image only • Max size {max_size}")
        } else {
            format!(
                "Max {} images • Max size {max_size} each",
                self.constraints.max_files()
            )
        }
    }

    /// Apply a drop: filter, update the selection, queue new files.
    ///
    /// Rejected files never get a preview and never abort the accepted
    /// subset. Files beyond the remaining capacity are cut from the end of
    /// the drop. The change callback runs only when the selection changed.
    /// A widget that is not interactive ignores the drop.
    pub fn drop_files(&mut self, dropped: Vec<SelectedFile>) -> DropReport {
        let mut report = DropReport::default();
        if !self.is_interactive() {
            debug!(files = dropped.len(), "Drop ignored while not interactive");
            report.ignored = true;
            return report;
        }
        let mut valid = Vec::with_capacity(dropped.len());

        for file in dropped {
            match self.constraints.check(&file) {
                Ok(()) => valid.push(file),
                Err(reasons) => {
                    debug!(file_name = %file.name, "File rejected");
                    report.rejections.push(Rejection {
                        file_name: file.name,
                        reasons,
                    });
                }
            }
        }

        let plan = plan_selection(&self.selection, valid, self.constraints.max_files());

        for file in plan.overflow {
            report.rejections.push(Rejection {
                file_name: file.name,
                reasons: vec![RejectionReason::TooManyFiles {
                    max: self.constraints.max_files(),
                }],
            });
        }

        if plan.added.is_empty() {
            return report;
        }

        let new_previews: Vec<Option<PreviewHandle>> =
            plan.added.iter().map(|f| self.preview_for(f)).collect();

        let released = if plan.replaced {
            self.pending.clear();
            self.statuses.clear();
            mem::replace(&mut self.previews, new_previews)
        } else {
            self.previews.extend(new_previews);
            Vec::new()
        };
        self.selection = plan.next;
        drop(released);

        report.accepted = plan.added.iter().map(SelectedFile::id).collect();
        if self.upload_enabled {
            self.pending.extend(report.accepted.iter().copied());
        }

        debug!(
            accepted = report.accepted.len(),
            rejected = report.rejections.len(),
            selected = self.selection.len(),
            "Files dropped"
        );
        self.notify_change();
        report
    }

    /// Remove the file at `index` from the selection.
    ///
    /// Out-of-range indices are a no-op, as is removing from a widget that
    /// is not interactive. Uploads already sent are not retracted.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.selection.len() || !self.is_interactive() {
            return false;
        }

        let file = self.selection.remove(index);
        drop(self.previews.remove(index));
        self.pending.retain(|id| *id != file.id());
        self.statuses.remove(&file.id());

        debug!(file_name = %file.name, index, "File removed");
        self.notify_change();
        true
    }

    /// Take the queued files that are still selected, in selection order.
    pub fn take_pending(&mut self) -> Vec<SelectedFile> {
        let pending = mem::take(&mut self.pending);
        let files: Vec<SelectedFile> = self
            .selection
            .iter()
            .filter(|f| pending.contains(&f.id()))
            .cloned()
            .collect();

        for file in &files {
            self.statuses.insert(file.id(), FileStatus::Uploading);
        }
        files
    }

    /// Record outcomes for files returned by [`Self::take_pending`].
    ///
    /// Files removed in the meantime are ignored.
    pub fn record_outcomes(&mut self, files: &[SelectedFile], outcomes: &[UploadOutcome]) {
        for (file, outcome) in files.iter().zip(outcomes) {
            if let Some(status) = self.statuses.get_mut(&file.id()) {
                *status = match outcome.badge() {
                    UploadBadge::Uploaded => FileStatus::Uploaded,
                    UploadBadge::Failed => FileStatus::Failed,
                };
            }
        }
    }

    /// Send queued files through a coordinator and record the outcomes.
    pub async fn submit<B: UploadBackend>(
        &mut self,
        coordinator: &UploadCoordinator<B>,
    ) -> Vec<UploadOutcome> {
        let files = self.take_pending();
        if files.is_empty() {
            return Vec::new();
        }

        let outcomes = coordinator.upload_many(&files).await;
        self.record_outcomes(&files, &outcomes);
        outcomes
    }

    fn preview_for(&self, file: &SelectedFile) -> Option<PreviewHandle> {
        file.is_image().then(|| self.preview_store.create(file))
    }

    fn notify_change(&mut self) {
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.selection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AnyBackend, CdnBackend};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn constraints(max_files: usize, max_size: u64) -> AcceptanceConstraints {
        AcceptanceConstraints::new(
            max_files,
            max_size,
            BTreeMap::from([
                ("image/*".to_string(), vec![".png".to_string()]),
                ("application/pdf".to_string(), vec![".pdf".to_string()]),
            ]),
        )
        .expect("valid constraints")
    }

    fn png(name: &str) -> SelectedFile {
        SelectedFile::new(name, "image/png", vec![1, 2, 3])
    }

    fn pdf(name: &str) -> SelectedFile {
        SelectedFile::new(name, "application/pdf", vec![4, 5])
    }

    fn names(files: &[SelectedFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    fn widget(max_files: usize, upload_enabled: bool, store: &PreviewStore) -> FileUploadWidget {
        FileUploadWidget::new(
            constraints(max_files, 1_048_576),
            UploadDestination::cdn("events/photos"),
            upload_enabled,
            store.clone(),
        )
    }

    fn demo_coordinator() -> UploadCoordinator<AnyBackend> {
        UploadCoordinator::new(
            AnyBackend::Cdn(Arc::new(CdnBackend::new(None))),
            UploadDestination::cdn("events/photos"),
        )
    }

    #[test]
    fn test_too_large_file_leaves_selection_empty() {
        let store = PreviewStore::default();
        let changes = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&changes);
        let mut widget = widget(1, false, &store).on_change(move |_| *counter.lock().unwrap() += 1);

        let report = widget.drop_files(vec![SelectedFile::new(
            "big.png",
            "image/png",
            vec![0u8; 2 * 1_048_576],
        )]);

        assert!(widget.selection().is_empty());
        assert_eq!(report.rejections.len(), 1);
        assert!(report.rejections[0].reasons[0].to_string().contains("too large"));
        assert_eq!(*changes.lock().unwrap(), 0);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_drop_beyond_capacity_keeps_first_files() {
        let store = PreviewStore::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut widget = widget(3, false, &store)
            .with_selection(vec![png("A.png"), png("B.png")])
            .on_change(move |files| sink.lock().unwrap().push(files.len()));

        let report = widget.drop_files(vec![png("C.png"), png("D.png")]);

        assert_eq!(names(widget.selection()), vec!["A.png", "B.png", "C.png"]);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections[0].file_name, "D.png");
    }

    #[test]
    fn test_single_slot_replaces_and_revokes_preview() {
        let store = PreviewStore::default();
        let mut widget = widget(1, false, &store);

        widget.drop_files(vec![png("old.png")]);
        let old_url = widget.preview_url(0).expect("slot").to_string();
        assert_eq!(store.live_count(), 1);

        widget.drop_files(vec![png("new.png")]);
        assert_eq!(names(widget.selection()), vec!["new.png"]);
        assert_eq!(store.live_count(), 1);
        assert_ne!(widget.preview_url(0), Some(old_url.as_str()));
    }

    #[test]
    fn test_non_images_have_empty_preview_slot() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store);

        widget.drop_files(vec![pdf("ticket.pdf"), png("me.png")]);

        assert_eq!(widget.preview_url(0), Some(""));
        assert!(widget.preview_url(1).is_some_and(|u| !u.is_empty()));
        assert_eq!(widget.preview_url(2), None);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_rejected_and_accepted_in_one_drop() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store);

        let report = widget.drop_files(vec![
            SelectedFile::new("notes.txt", "text/plain", vec![1]),
            png("ok.png"),
        ]);

        assert_eq!(names(widget.selection()), vec!["ok.png"]);
        assert_eq!(report.rejections.len(), 1);
        assert!(matches!(
            report.rejections[0].reasons[0],
            RejectionReason::InvalidType { .. }
        ));
    }

    #[test]
    fn test_remove_is_idempotent_past_end() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store);
        widget.drop_files(vec![png("a.png"), png("b.png")]);

        assert!(widget.remove(1));
        assert!(!widget.remove(1));
        assert_eq!(names(widget.selection()), vec!["a.png"]);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_teardown_releases_every_preview() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store);
        widget.drop_files(vec![png("a.png"), png("b.png"), pdf("c.pdf")]);
        assert_eq!(store.live_count(), 2);

        drop(widget);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_hint_text() {
        let store = PreviewStore::default();
        assert_eq!(widget(1, false, &store).hint(), "Single image only • Max size 1 MB");
        assert_eq!(
            widget(4, false, &store).hint(),
            "Max 4 images • Max size 1 MB each"
        );
    }

    #[test]
    fn test_upload_disabled_queues_nothing() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store);
        widget.drop_files(vec![png("a.png")]);

        assert!(widget.take_pending().is_empty());
        assert_eq!(widget.status(0), None);
    }

    #[tokio::test]
    async fn test_submit_uploads_only_new_batch() {
        let store = PreviewStore::default();
        let coordinator = demo_coordinator();
        let mut widget = widget(3, true, &store).with_selection(vec![png("A.png")]);

        widget.drop_files(vec![png("B.png"), pdf("C.pdf")]);
        assert_eq!(widget.status(1), Some(FileStatus::Ready));

        let outcomes = widget.submit(&coordinator).await;

        let uploaded: Vec<_> = outcomes
            .iter()
            .map(|o| o.file_name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(uploaded, vec!["B.png", "C.pdf"]);
        assert_eq!(
            outcomes[0].url.as_deref(),
            Some("https://demo-bytescale.com/events/photos/B.png")
        );
        assert_eq!(widget.status(0), Some(FileStatus::Ready));
        assert_eq!(widget.status(1), Some(FileStatus::Uploaded));
        assert_eq!(widget.status(2), Some(FileStatus::Uploaded));
    }

    #[tokio::test]
    async fn test_removed_before_upload_never_reaches_coordinator() {
        let store = PreviewStore::default();
        let coordinator = demo_coordinator();
        let mut widget = widget(3, true, &store);

        widget.drop_files(vec![png("keep.png"), png("gone.png")]);
        widget.remove(1);
        widget.submit(&coordinator).await;

        let state = coordinator.state();
        assert_eq!(state.outcomes.len(), 1);
        assert_eq!(state.outcomes[0].file_name.as_deref(), Some("keep.png"));
    }

    #[tokio::test]
    async fn test_remove_after_upload_keeps_outcomes() {
        let store = PreviewStore::default();
        let coordinator = demo_coordinator();
        let mut widget = widget(3, true, &store);

        widget.drop_files(vec![png("a.png")]);
        widget.submit(&coordinator).await;
        widget.remove(0);

        assert!(widget.selection().is_empty());
        assert_eq!(coordinator.state().outcomes.len(), 1);
    }

    #[test]
    fn test_disabled_widget_ignores_drop_and_remove() {
        let store = PreviewStore::default();
        let mut widget = widget(3, false, &store)
            .with_selection(vec![png("a.png")])
            .with_disabled(true);

        let report = widget.drop_files(vec![png("b.png")]);
        assert!(report.ignored);
        assert!(!report.changed());
        assert!(!widget.remove(0));
        assert_eq!(names(widget.selection()), vec!["a.png"]);

        widget.set_disabled(false);
        assert!(widget.drop_files(vec![png("b.png")]).changed());
        assert!(widget.remove(0));
        assert_eq!(names(widget.selection()), vec!["b.png"]);
    }

    #[test]
    fn test_outstanding_batch_blocks_interaction() {
        let store = PreviewStore::default();
        let mut widget = widget(3, true, &store);
        widget.drop_files(vec![png("a.png")]);

        let batch = widget.take_pending();
        assert!(widget.is_uploading());
        assert!(!widget.is_interactive());
        assert_eq!(widget.status(0), Some(FileStatus::Uploading));
        assert!(widget.drop_files(vec![png("b.png")]).ignored);
        assert!(!widget.remove(0));

        let outcomes = vec![UploadOutcome::failed("a.png", "boom")];
        widget.record_outcomes(&batch, &outcomes);
        assert!(widget.is_interactive());
        assert_eq!(widget.status(0), Some(FileStatus::Failed));
    }

    fn non_image_mime() -> impl Strategy<Value = String> {
        prop_oneof![
            "(application|text|audio|video|font)/[a-z0-9.+-]{1,16}",
            Just(String::new()),
        ]
    }

    proptest! {
        // Non-image files never hold a live preview, whatever their name or type.
        #[test]
        fn prop_non_images_have_empty_preview_slot(
            stems in prop::collection::vec("[A-Za-z0-9 _-]{1,16}", 1..6),
            ext in "(pdf|txt|doc|png|jpg|svg)",
            mime in non_image_mime(),
        ) {
            let store = PreviewStore::default();
            let any_type = AcceptanceConstraints::new(10, 1_048_576, BTreeMap::new())
                .expect("valid constraints");
            let mut widget = FileUploadWidget::new(any_type, UploadDestination::default(), false, store.clone());

            let files: Vec<SelectedFile> = stems
                .iter()
                .map(|stem| SelectedFile::new(format!("{stem}.{ext}"), mime.clone(), vec![1]))
                .collect();
            let report = widget.drop_files(files);

            prop_assert_eq!(report.accepted.len(), stems.len());
            for index in 0..stems.len() {
                prop_assert_eq!(widget.preview_url(index), Some(""));
            }
            prop_assert_eq!(store.live_count(), 0);
        }
    }
}
