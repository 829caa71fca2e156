//! Acceptance constraints applied to dropped files.

use std::collections::BTreeMap;
use std::fmt;

use gatherly_shared::UploadSettings;
use serde::Serialize;
use thiserror::Error;

use super::types::{SelectedFile, format_file_size};

/// Why a dropped file was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Neither the MIME type nor the extension is accepted.
    InvalidType {
        /// Accepted patterns and extensions, for the message.
        accepted: String,
    },
    /// File exceeds the size limit.
    TooLarge {
        /// Declared size.
        size: u64,
        /// Limit in bytes.
        max: u64,
    },
    /// No slot left in the selection.
    TooManyFiles {
        /// Maximum number of files.
        max: usize,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidType { accepted } => write!(f, "file type must be one of {accepted}"),
            Self::TooLarge { max, .. } => {
                write!(f, "file is too large (max {})", format_file_size(*max))
            }
            Self::TooManyFiles { max } => write!(f, "too many files (max {max})"),
        }
    }
}

/// A dropped file that did not make it into the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Name of the rejected file.
    pub file_name: String,
    /// Every reason that applied.
    pub reasons: Vec<RejectionReason>,
}

impl Rejection {
    /// Reasons joined for inline display, e.g. `photo.bmp - file type must be ...`.
    #[must_use]
    pub fn message(&self) -> String {
        let reasons: Vec<String> = self.reasons.iter().map(ToString::to_string).collect();
        format!("{} - {}", self.file_name, reasons.join(", "))
    }
}

/// Invalid constraint values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstraintError {
    /// `max_files` must be at least one.
    #[error("max_files must be at least 1")]
    ZeroMaxFiles,
    /// `max_size_bytes` must be positive.
    #[error("max_size_bytes must be greater than 0")]
    ZeroMaxSize,
}

/// Count, size and type limits of one widget. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptanceConstraints {
    max_files: usize,
    max_size_bytes: u64,
    accepted_types: BTreeMap<String, Vec<String>>,
}

impl AcceptanceConstraints {
    /// Build constraints.
    ///
    /// An empty `accepted_types` map accepts every type.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_files` or `max_size_bytes` is zero.
    pub fn new(
        max_files: usize,
        max_size_bytes: u64,
        accepted_types: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ConstraintError> {
        if max_files == 0 {
            return Err(ConstraintError::ZeroMaxFiles);
        }
        if max_size_bytes == 0 {
            return Err(ConstraintError::ZeroMaxSize);
        }

        let accepted_types = accepted_types
            .into_iter()
            .map(|(pattern, exts)| {
                let exts = exts.into_iter().map(|e| normalize_extension(&e)).collect();
                (pattern.to_ascii_lowercase(), exts)
            })
            .collect();

        Ok(Self {
            max_files,
            max_size_bytes,
            accepted_types,
        })
    }

    /// Defaults taken from the configured upload settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured limits are zero.
    pub fn from_settings(settings: &UploadSettings) -> Result<Self, ConstraintError> {
        Self::new(
            settings.max_files,
            settings.max_file_size,
            settings.accepted_types.clone(),
        )
    }

    /// Maximum number of selected files.
    #[must_use]
    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Maximum size of a single file.
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Accepted MIME patterns and extensions.
    #[must_use]
    pub fn accepted_types(&self) -> &BTreeMap<String, Vec<String>> {
        &self.accepted_types
    }

    /// Whether a new file replaces the selection instead of appending.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.max_files == 1
    }

    /// Check type and size of one file. Count limits are applied by the widget.
    ///
    /// # Errors
    ///
    /// Returns every reason the file is not acceptable.
    pub fn check(&self, file: &SelectedFile) -> Result<(), Vec<RejectionReason>> {
        let mut reasons = Vec::new();

        if !self.type_accepted(file) {
            reasons.push(RejectionReason::InvalidType {
                accepted: self.describe_accepted(),
            });
        }
        if file.size > self.max_size_bytes {
            reasons.push(RejectionReason::TooLarge {
                size: file.size,
                max: self.max_size_bytes,
            });
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(reasons)
        }
    }

    /// A file passes when its MIME type matches a pattern or its extension
    /// is listed under any pattern.
    fn type_accepted(&self, file: &SelectedFile) -> bool {
        if self.accepted_types.is_empty() {
            return true;
        }

        let mime = file.mime_type.to_ascii_lowercase();
        let extension = file.extension();

        self.accepted_types.iter().any(|(pattern, exts)| {
            mime_matches(pattern, &mime)
                || extension
                    .as_ref()
                    .is_some_and(|ext| exts.iter().any(|e| e == ext))
        })
    }

    fn describe_accepted(&self) -> String {
        self.accepted_types
            .iter()
            .flat_map(|(pattern, exts)| {
                std::iter::once(pattern.as_str()).chain(exts.iter().map(String::as_str))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    if mime.is_empty() {
        return false;
    }
    match pattern.strip_suffix("/*") {
        Some("*") => true,
        Some(prefix) => mime
            .split_once('/')
            .is_some_and(|(top, _)| top == prefix),
        None => pattern == mime,
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn default_constraints() -> AcceptanceConstraints {
        AcceptanceConstraints::from_settings(&UploadSettings::default()).expect("valid defaults")
    }

    fn file(name: &str, mime: &str, size: usize) -> SelectedFile {
        SelectedFile::new(name, mime, vec![0u8; size])
    }

    #[rstest]
    #[case("photo.png", "image/png", true)]
    #[case("photo.webp", "image/webp", true)]
    #[case("scan.pdf", "application/pdf", true)]
    #[case("renamed.jpg", "", true)]
    #[case("notes.txt", "text/plain", false)]
    #[case("archive.zip", "application/zip", false)]
    fn test_type_acceptance(#[case] name: &str, #[case] mime: &str, #[case] accepted: bool) {
        let result = default_constraints().check(&file(name, mime, 10));
        assert_eq!(result.is_ok(), accepted, "{name} ({mime})");
    }

    #[test]
    fn test_too_large_is_reported() {
        let constraints =
            AcceptanceConstraints::new(1, 1_048_576, BTreeMap::new()).expect("valid constraints");
        let reasons = constraints
            .check(&file("big.png", "image/png", 2 * 1_048_576))
            .unwrap_err();
        assert_eq!(
            reasons,
            vec![RejectionReason::TooLarge {
                size: 2 * 1_048_576,
                max: 1_048_576
            }]
        );
        assert!(reasons[0].to_string().contains("too large"));
    }

    #[test]
    fn test_all_reasons_are_collected() {
        let constraints = AcceptanceConstraints::new(1, 4, default_constraints().accepted_types().clone())
            .expect("valid constraints");
        let reasons = constraints
            .check(&file("tool.exe", "application/x-msdownload", 8))
            .unwrap_err();
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn test_zero_limits_are_invalid() {
        assert_eq!(
            AcceptanceConstraints::new(0, 1, BTreeMap::new()),
            Err(ConstraintError::ZeroMaxFiles)
        );
        assert_eq!(
            AcceptanceConstraints::new(1, 0, BTreeMap::new()),
            Err(ConstraintError::ZeroMaxSize)
        );
    }

    #[test]
    fn test_extensions_are_normalized() {
        let constraints = AcceptanceConstraints::new(
            3,
            10,
            BTreeMap::from([("text/csv".to_string(), vec!["CSV".to_string()])]),
        )
        .expect("valid constraints");
        assert!(constraints.check(&file("export.csv", "application/octet-stream", 1)).is_ok());
    }

    #[test]
    fn test_rejection_message() {
        let rejection = Rejection {
            file_name: "d.png".into(),
            reasons: vec![RejectionReason::TooManyFiles { max: 3 }],
        };
        assert_eq!(rejection.message(), "d.png - too many files (max 3)");
    }
}
