//! CDN upload API adapter.

use std::future::Future;

use gatherly_shared::CdnSettings;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use tracing::{debug, info};

use super::UploadBackend;
use crate::upload::{BackendKind, SelectedFile, StoredObject, UploadDestination, UploadError};

/// Live credentials for the CDN upload API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    /// Secret API key sent as a bearer token.
    pub api_key: String,
    /// Account the uploads belong to.
    pub account_id: String,
    /// Folder used when a destination names none.
    pub folder: Option<String>,
    /// Base URL of the upload API.
    pub base_url: String,
}

/// Length of the account id embedded in an API key.
const ACCOUNT_ID_LEN: usize = 7;

impl CdnConfig {
    /// Resolve from settings. Returns `None` when the API key is missing or empty.
    ///
    /// The account id falls back to the one embedded in the key.
    #[must_use]
    pub fn from_settings(settings: &CdnSettings) -> Option<Self> {
        let api_key = non_empty(settings.api_key.as_deref())?;
        let account_id = non_empty(settings.account_id.as_deref())
            .map_or_else(|| account_id_from_key(api_key), String::from);

        Some(Self {
            api_key: api_key.to_string(),
            account_id,
            folder: non_empty(settings.folder.as_deref()).map(String::from),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Account id of a key shaped like `secret_{account}{rest}` or `public_{account}{rest}`.
///
/// Keys without a recognised prefix are used as they are.
#[must_use]
pub fn account_id_from_key(api_key: &str) -> String {
    let body = ["secret_", "public_"]
        .iter()
        .find_map(|prefix| api_key.strip_prefix(prefix))
        .filter(|body| !body.is_empty())
        .unwrap_or(api_key);

    body.chars().take(ACCOUNT_ID_LEN).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Successful upload response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_url: String,
    #[serde(default)]
    file_path: Option<String>,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Uploads files through the CDN upload API, one request per file.
pub struct CdnBackend {
    client: reqwest::Client,
    config: Option<CdnConfig>,
}

impl CdnBackend {
    /// Create a backend. `None` means demo mode.
    #[must_use]
    pub fn new(config: Option<CdnConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a backend from settings.
    #[must_use]
    pub fn from_settings(settings: &CdnSettings) -> Self {
        Self::new(CdnConfig::from_settings(settings))
    }

    /// Resolved configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<&CdnConfig> {
        self.config.as_ref()
    }

    /// Folder the file lands in: the destination's, else the configured one.
    fn folder_for<'a>(&'a self, destination: &'a UploadDestination) -> Option<&'a str> {
        destination.folder().or_else(|| {
            self.config
                .as_ref()
                .and_then(|c| c.folder.as_deref())
                .map(|f| f.trim_matches('/'))
                .filter(|f| !f.is_empty())
        })
    }

    /// Upload path: `{folder}/{name}` or just the name.
    fn upload_path(&self, file: &SelectedFile, destination: &UploadDestination) -> String {
        match self.folder_for(destination) {
            Some(folder) => format!("{folder}/{}", file.name),
            None => file.name.clone(),
        }
    }

    async fn send(
        &self,
        config: &CdnConfig,
        file: &SelectedFile,
        destination: &UploadDestination,
    ) -> Result<StoredObject, UploadError> {
        let url = format!(
            "{}/v2/accounts/{}/uploads/binary",
            config.base_url, config.account_id
        );
        let folder_path = format!("/{}", self.folder_for(destination).unwrap_or_default());
        let content_type = if file.mime_type.is_empty() {
            "application/octet-stream"
        } else {
            file.mime_type.as_str()
        };

        debug!(
            path = %self.upload_path(file, destination),
            account_id = %config.account_id,
            size = file.size,
            "Uploading file to CDN"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .header(header::CONTENT_TYPE, content_type)
            .query(&[("fileName", file.name.as_str()), ("folderPath", folder_path.as_str())])
            .body(file.data.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(match status {
                StatusCode::UNAUTHORIZED => UploadError::Unauthorized(message),
                StatusCode::FORBIDDEN => UploadError::AccessDenied(message),
                _ => UploadError::rejected(status.as_u16(), message),
            });
        }

        let body: UploadResponse = response.json().await?;
        info!(file_name = %file.name, url = %body.file_url, "File uploaded to CDN");

        Ok(StoredObject {
            url: body.file_url,
            key: body.file_path,
        })
    }
}

impl UploadBackend for CdnBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cdn
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn put(
        &self,
        file: &SelectedFile,
        destination: &UploadDestination,
    ) -> impl Future<Output = Result<StoredObject, UploadError>> + Send {
        async move {
            let config = self.config.as_ref().ok_or(UploadError::NotConfigured)?;
            self.send(config, file, destination).await
        }
    }
}
