//! Upload domain types shared by the widget, the coordinator and the backends.

mod constraints;
mod error;
mod types;

pub use constraints::{AcceptanceConstraints, ConstraintError, Rejection, RejectionReason};
pub use error::{UploadError, is_credential_message};
pub use types::{
    BackendKind, DEFAULT_FOLDER, FileId, ObjectMetadata, SelectedFile, StoredObject, UploadBadge,
    UploadDestination, UploadOutcome, format_file_size,
};
pub(crate) use types::file_extension;
