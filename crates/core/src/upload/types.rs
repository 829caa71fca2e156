//! Upload types and data structures.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Folder used when a destination does not name one.
pub const DEFAULT_FOLDER: &str = "uploads";

/// Which upload backend a destination targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CDN-style upload API.
    #[default]
    Cdn,
    /// S3-compatible bucket service.
    S3Compatible,
}

impl BackendKind {
    /// Stable name used in logs and routes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdn => "cdn",
            Self::S3Compatible => "s3",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where uploads of one widget should land.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    /// Backend the files are sent to.
    pub backend_kind: BackendKind,
    /// Bucket name (S3-compatible only).
    #[serde(default)]
    pub bucket: Option<String>,
    /// Folder prefix inside the bucket or CDN account.
    #[serde(default)]
    pub folder: Option<String>,
    /// Mark stored objects as publicly readable.
    #[serde(default = "default_make_public")]
    pub make_public: bool,
}

fn default_make_public() -> bool {
    true
}

impl UploadDestination {
    /// Destination on the CDN backend.
    #[must_use]
    pub fn cdn(folder: impl Into<String>) -> Self {
        Self {
            backend_kind: BackendKind::Cdn,
            bucket: None,
            folder: Some(folder.into()),
            make_public: true,
        }
    }

    /// Destination on the S3-compatible backend.
    #[must_use]
    pub fn s3(bucket: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            backend_kind: BackendKind::S3Compatible,
            bucket: Some(bucket.into()),
            folder: Some(folder.into()),
            make_public: true,
        }
    }

    /// The folder without surrounding slashes, if one is set and non-empty.
    #[must_use]
    pub fn folder(&self) -> Option<&str> {
        self.folder
            .as_deref()
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
    }

    /// The folder, falling back to [`DEFAULT_FOLDER`].
    #[must_use]
    pub fn folder_or_default(&self) -> &str {
        self.folder().unwrap_or(DEFAULT_FOLDER)
    }

    /// The bucket, if one is set and non-empty.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }
}

/// Identity of a selected file for the lifetime of a widget.
///
/// Positions in the selection list are what callers address; the id only
/// lets the widget recognise a file again after the list has shifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file picked by the user, with its client-declared name and type.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    id: FileId,
    /// Original file name.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Declared size in bytes.
    pub size: u64,
    /// File contents.
    pub data: Bytes,
}

impl SelectedFile {
    /// Create a file whose declared size is the length of its contents.
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            id: FileId::new(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            data,
        }
    }

    /// Widget-local identity.
    #[must_use]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Whether the declared type is an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Extension of the original name including the dot, lower-cased.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name).map(|ext| format!(".{}", ext.to_ascii_lowercase()))
    }
}

/// Extension of a file name without the dot.
pub(crate) fn file_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Result of one upload attempt. One per submitted file, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Whether the file is considered uploaded.
    pub success: bool,
    /// Public or canonical URL of the stored file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Storage key, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Error message for failed uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Original file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Synthesized without a real upload.
    #[serde(default)]
    pub demo: bool,
}

impl UploadOutcome {
    /// Outcome of a real, successful upload.
    #[must_use]
    pub fn uploaded(file_name: &str, object: StoredObject) -> Self {
        Self {
            success: true,
            url: Some(object.url),
            key: object.key,
            error: None,
            file_name: Some(file_name.to_string()),
            demo: false,
        }
    }

    /// Synthesized successful outcome used in demo mode.
    #[must_use]
    pub fn demo(file_name: &str, url: String, key: Option<String>) -> Self {
        Self {
            success: true,
            url: Some(url),
            key,
            error: None,
            file_name: Some(file_name.to_string()),
            demo: true,
        }
    }

    /// Failed upload.
    #[must_use]
    pub fn failed(file_name: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            key: None,
            error: Some(error.into()),
            file_name: Some(file_name.to_string()),
            demo: false,
        }
    }

    /// Badge shown to the end user. Demo outcomes look like real ones.
    #[must_use]
    pub fn badge(&self) -> UploadBadge {
        if self.success {
            UploadBadge::Uploaded
        } else {
            UploadBadge::Failed
        }
    }
}

/// User-facing upload badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadBadge {
    /// Stored (or demo-substituted).
    Uploaded,
    /// Upload failed.
    Failed,
}

/// What a backend reports for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Location of the object.
    pub url: String,
    /// Storage key, if the backend has one.
    pub key: Option<String>,
}

/// Metadata of an object listed from a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    /// Storage key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Content type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Format a byte count for display, e.g. `1.5 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
