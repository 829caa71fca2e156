//! Upload backends: a CDN upload API and an S3-compatible bucket service.
//!
//! Both variants implement [`UploadBackend`]; [`AnyBackend`] selects one by
//! [`BackendKind`] so the coordinator never checks for capabilities.
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────┐
//! │ CdnBackend (reqwest)     │ S3Backend (Apache OpenDAL)           │
//! ├──────────────────────────┼──────────────────────────────────────┤
//! │ POST .../uploads/binary  │ put_object / delete_object           │
//! │   -> fileUrl             │ list_objects / presign_read          │
//! └──────────────────────────┴──────────────────────────────────────┘
//! ```

mod cdn;
mod s3;

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::upload::{
    BackendKind, SelectedFile, StoredObject, UploadDestination, UploadError, UploadOutcome,
};

pub use cdn::{CdnBackend, CdnConfig, account_id_from_key};
pub use s3::{
    ObjectAcl, PutObjectOutput, PutObjectRequest, S3Backend, S3Config, generate_object_key,
};

/// Host of synthesized CDN URLs in demo mode.
pub const DEMO_CDN_HOST: &str = "https://demo-bytescale.com";
/// Host of synthesized bucket URLs in demo mode.
pub const DEMO_S3_HOST: &str = "https://demo-bucket.nyc3.digitaloceanspaces.com";

/// Something that can store a file at a destination.
pub trait UploadBackend: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Whether live credentials are available.
    fn is_configured(&self) -> bool;

    /// Store one file.
    fn put(
        &self,
        file: &SelectedFile,
        destination: &UploadDestination,
    ) -> impl Future<Output = Result<StoredObject, UploadError>> + Send;

    /// Outcome reported instead of a real upload in demo mode.
    fn demo_outcome(&self, file: &SelectedFile, destination: &UploadDestination) -> UploadOutcome {
        demo_outcome(self.kind(), file, destination)
    }

    /// Store one file and fold any error into the outcome.
    ///
    /// An unconfigured backend answers with a demo outcome and makes no call.
    fn upload_one(
        &self,
        file: &SelectedFile,
        destination: &UploadDestination,
    ) -> impl Future<Output = UploadOutcome> + Send {
        async move {
            if !self.is_configured() {
                return self.demo_outcome(file, destination);
            }
            match self.put(file, destination).await {
                Ok(object) => UploadOutcome::uploaded(&file.name, object),
                Err(e) => {
                    warn!(backend = %self.kind(), file_name = %file.name, error = %e, "Upload failed");
                    UploadOutcome::failed(&file.name, e.to_string())
                }
            }
        }
    }

    /// Store every file concurrently. Outcomes keep submission order.
    fn upload_many(
        &self,
        files: &[SelectedFile],
        destination: &UploadDestination,
    ) -> impl Future<Output = Vec<UploadOutcome>> + Send {
        join_all(files.iter().map(|file| self.upload_one(file, destination)))
    }
}

/// Demo outcome for a backend kind: fixed host, destination folder, original name.
#[must_use]
pub fn demo_outcome(
    kind: BackendKind,
    file: &SelectedFile,
    destination: &UploadDestination,
) -> UploadOutcome {
    let folder = destination.folder_or_default();
    match kind {
        BackendKind::Cdn => {
            UploadOutcome::demo(&file.name, format!("{DEMO_CDN_HOST}/{folder}/{}", file.name), None)
        }
        BackendKind::S3Compatible => {
            let key = format!("{folder}/{}", file.name);
            UploadOutcome::demo(&file.name, format!("{DEMO_S3_HOST}/{key}"), Some(key))
        }
    }
}

/// A backend selected by [`BackendKind`].
#[derive(Clone)]
pub enum AnyBackend {
    /// CDN upload API.
    Cdn(Arc<CdnBackend>),
    /// S3-compatible bucket.
    S3(Arc<S3Backend>),
}

impl UploadBackend for AnyBackend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Cdn(_) => BackendKind::Cdn,
            Self::S3(_) => BackendKind::S3Compatible,
        }
    }

    fn is_configured(&self) -> bool {
        match self {
            Self::Cdn(backend) => backend.is_configured(),
            Self::S3(backend) => backend.is_configured(),
        }
    }

    fn put(
        &self,
        file: &SelectedFile,
        destination: &UploadDestination,
    ) -> impl Future<Output = Result<StoredObject, UploadError>> + Send {
        async move {
            match self {
                Self::Cdn(backend) => backend.put(file, destination).await,
                Self::S3(backend) => backend.put(file, destination).await,
            }
        }
    }
}
