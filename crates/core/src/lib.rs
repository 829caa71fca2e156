//! Upload domain for Gatherly.
//!
//! This crate contains the file-upload widget, the coordinator and the
//! storage backends. It has no web framework dependencies; the API crate
//! wires these pieces to HTTP routes.
//!
//! # Modules
//!
//! - `upload` - Shared types, acceptance constraints and upload errors
//! - `widget` - Selection list, previews and drop handling
//! - `coordinator` - Batch upload state and credential degradation
//! - `backend` - CDN and S3-compatible adapters
//! - `providers` - Backends resolved from configuration, demo mode flags

pub mod backend;
pub mod coordinator;
pub mod providers;
pub mod upload;
pub mod widget;

pub use backend::{AnyBackend, UploadBackend};
pub use coordinator::{CoordinatorState, UploadCoordinator, UploadListener, UploadPhase};
pub use providers::{ProviderStatus, UploadProviders};
pub use widget::{DropReport, FileStatus, FileUploadWidget, PreviewStore};
