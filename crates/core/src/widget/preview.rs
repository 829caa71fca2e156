//! Local preview references for image files.
//!
//! A [`PreviewHandle`] keeps its preview alive; dropping the handle revokes
//! it. The widget stores one handle per image slot, so removing a file,
//! replacing the selection or dropping the widget always releases previews.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::upload::SelectedFile;

/// Bytes and type served for a live preview.
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    /// Declared MIME type.
    pub mime_type: String,
    /// Image bytes.
    pub data: Bytes,
}

/// Registry of live previews, shared by every widget of a process.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    entries: Arc<DashMap<Uuid, PreviewEntry>>,
    base_url: Arc<str>,
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::new("preview://local")
    }
}

impl PreviewStore {
    /// Create a store whose URLs look like `{base_url}/{id}`.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    /// Register a preview for a file.
    #[must_use]
    pub fn create(&self, file: &SelectedFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            PreviewEntry {
                mime_type: file.mime_type.clone(),
                data: file.data.clone(),
            },
        );
        debug!(preview_id = %id, file_name = %file.name, "Preview created");

        PreviewHandle {
            id,
            url: format!("{}/{id}", self.base_url),
            entries: Arc::clone(&self.entries),
        }
    }

    /// Look up a live preview.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<PreviewEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of previews not yet revoked.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}

/// Owner of one live preview.
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    url: String,
    entries: Arc<DashMap<Uuid, PreviewEntry>>,
}

impl PreviewHandle {
    /// Preview id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Preview URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
        debug!(preview_id = %self.id, "Preview revoked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_drop_revokes_preview() {
        let store = PreviewStore::new("/api/v1/previews/");
        let file = SelectedFile::new("me.png", "image/png", vec![9, 9]);

        let handle = store.create(&file);
        assert_eq!(handle.url(), format!("/api/v1/previews/{}", handle.id()));
        assert_eq!(store.live_count(), 1);

        let entry = store.get(handle.id()).expect("live preview");
        assert_eq!(entry.mime_type, "image/png");
        assert_eq!(entry.data.as_ref(), &[9, 9]);

        let id = handle.id();
        drop(handle);
        assert_eq!(store.live_count(), 0);
        assert!(store.get(id).is_none());
    }
}
