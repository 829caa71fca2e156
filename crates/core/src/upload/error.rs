//! Upload error types.

use thiserror::Error;

/// Errors raised by an upload backend for a single file.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Backend has no usable configuration.
    #[error("upload backend is not configured")]
    NotConfigured,

    /// No bucket on the destination and no default bucket configured.
    #[error("bucket name is not configured")]
    MissingBucket,

    /// Backend rejected the credentials.
    #[error("invalid credentials: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack permission.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Backend answered with a non-success status.
    #[error("upload rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message returned by the backend.
        message: String,
    },

    /// Request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Object storage operation failed.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// Response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Whether the failure looks like a credential or permission problem.
    ///
    /// Matches on the rendered message, so errors relayed verbatim from a
    /// provider are classified the same way as our own variants.
    #[must_use]
    pub fn is_credential_related(&self) -> bool {
        is_credential_message(&self.to_string())
    }

    /// Create a rejected error.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Case-insensitive check for `credentials` or `access` in a message.
#[must_use]
pub fn is_credential_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("credentials") || message.contains("access")
}

impl From<opendal::Error> for UploadError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::PermissionDenied => Self::AccessDenied(err.to_string()),
            opendal::ErrorKind::ConfigInvalid => Self::Unauthorized(err.to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
