//! Application configuration management.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// Environment variable prefix, e.g. `GATHERLY__UPLOADS__CDN__API_KEY`.
pub const ENV_PREFIX: &str = "GATHERLY";

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload provider configuration.
    #[serde(default)]
    pub uploads: UploadSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Upload settings shared by every file field of the registration form.
///
/// Credentials are optional on purpose: a provider whose required keys are
/// missing is simply reported as unconfigured and runs in demo mode.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// CDN upload API settings.
    #[serde(default)]
    pub cdn: CdnSettings,
    /// S3-compatible bucket settings.
    #[serde(default)]
    pub s3: S3Settings,
    /// Surface credential failures instead of substituting demo outcomes.
    #[serde(default)]
    pub strict_mode: bool,
    /// Default maximum number of files per field.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Default maximum size of a single file, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME patterns mapped to their allowed extensions.
    #[serde(default = "default_accepted_types")]
    pub accepted_types: BTreeMap<String, Vec<String>>,
    /// Seconds an untouched form session stays open.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            cdn: CdnSettings::default(),
            s3: S3Settings::default(),
            strict_mode: false,
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
            accepted_types: default_accepted_types(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_max_files() -> usize {
    1
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

fn default_accepted_types() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (
            "image/*".to_string(),
            vec![
                ".jpeg".to_string(),
                ".jpg".to_string(),
                ".png".to_string(),
                ".gif".to_string(),
            ],
        ),
        ("application/pdf".to_string(), vec![".pdf".to_string()]),
    ])
}

/// CDN upload API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CdnSettings {
    /// Secret API key. Required for live uploads.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Account the uploads are billed to. Defaults to the one embedded in the API key.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Folder prepended to every upload path.
    #[serde(default)]
    pub folder: Option<String>,
    /// Base URL of the upload API.
    #[serde(default = "default_cdn_base_url")]
    pub base_url: String,
}

impl Default for CdnSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            account_id: None,
            folder: None,
            base_url: default_cdn_base_url(),
        }
    }
}

fn default_cdn_base_url() -> String {
    "https://api.bytescale.com".to_string()
}

/// S3-compatible bucket settings.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Settings {
    /// Service endpoint, e.g. `https://nyc3.digitaloceanspaces.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Default bucket used when a destination names none.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Region.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            bucket: None,
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "nyc3".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Resolves configuration from an explicit environment-style map.
    ///
    /// Keys use the same shape as real environment variables
    /// (`GATHERLY__UPLOADS__S3__BUCKET`). Nothing is read from the process.
    ///
    /// # Errors
    ///
    /// Returns an error if a present value cannot be deserialized.
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(Some(vars)),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl UploadSettings {
    /// Resolves upload settings from an explicit environment-style map.
    ///
    /// # Errors
    ///
    /// Returns an error if a present value cannot be deserialized.
    pub fn from_source(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        AppConfig::from_env_map(vars).map(|config| config.uploads)
    }
}
