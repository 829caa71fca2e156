//! Shared errors and configuration for Gatherly.
//!
//! This crate provides what every other crate needs:
//! - Application-wide error types
//! - Configuration management (server and upload providers)

pub mod config;
pub mod error;

pub use config::{AppConfig, CdnSettings, S3Settings, ServerConfig, UploadSettings};
pub use error::{AppError, AppResult};
