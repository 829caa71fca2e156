//! Upload providers resolved once from configuration.
//!
//! Replaces process-wide provider state: the application builds one
//! [`UploadProviders`] at startup and hands backends to whoever needs them.

use std::sync::Arc;

use gatherly_shared::UploadSettings;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{AnyBackend, CdnBackend, S3Backend, UploadBackend};
use crate::upload::BackendKind;

/// Configured/demo flags of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Backend kind.
    pub kind: BackendKind,
    /// Live credentials are available.
    pub configured: bool,
    /// Uploads are synthesized.
    pub demo_mode: bool,
}

/// Both upload backends plus the degradation policy.
#[derive(Clone)]
pub struct UploadProviders {
    cdn: Arc<CdnBackend>,
    s3: Arc<S3Backend>,
    strict_mode: bool,
}

impl UploadProviders {
    /// Resolve both providers from settings. Missing keys yield demo mode.
    #[must_use]
    pub fn from_settings(settings: &UploadSettings) -> Self {
        let providers = Self::new(
            CdnBackend::from_settings(&settings.cdn),
            S3Backend::from_settings(&settings.s3),
            settings.strict_mode,
        );

        for status in providers.statuses() {
            if status.configured {
                info!(backend = %status.kind, "Upload provider configured");
            } else {
                warn!(backend = %status.kind, "Upload provider not configured, using demo mode");
            }
        }

        providers
    }

    /// Assemble providers from already built backends.
    #[must_use]
    pub fn new(cdn: CdnBackend, s3: S3Backend, strict_mode: bool) -> Self {
        Self {
            cdn: Arc::new(cdn),
            s3: Arc::new(s3),
            strict_mode,
        }
    }

    /// Backend for a destination kind.
    #[must_use]
    pub fn backend(&self, kind: BackendKind) -> AnyBackend {
        match kind {
            BackendKind::Cdn => AnyBackend::Cdn(Arc::clone(&self.cdn)),
            BackendKind::S3Compatible => AnyBackend::S3(Arc::clone(&self.s3)),
        }
    }

    /// The S3-compatible backend, for bucket maintenance.
    #[must_use]
    pub fn s3(&self) -> &S3Backend {
        &self.s3
    }

    /// Whether credential failures are surfaced instead of degraded.
    #[must_use]
    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Whether a provider has live credentials.
    #[must_use]
    pub fn is_configured(&self, kind: BackendKind) -> bool {
        self.backend(kind).is_configured()
    }

    /// Whether a provider runs in demo mode.
    #[must_use]
    pub fn is_demo_mode(&self, kind: BackendKind) -> bool {
        !self.is_configured(kind)
    }

    /// Status of every provider.
    #[must_use]
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        [BackendKind::Cdn, BackendKind::S3Compatible]
            .into_iter()
            .map(|kind| {
                let configured = self.is_configured(kind);
                ProviderStatus {
                    kind,
                    configured,
                    demo_mode: !configured,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_settings_are_demo_mode() {
        let providers = UploadProviders::from_settings(&UploadSettings::default());
        assert!(providers.is_demo_mode(BackendKind::Cdn));
        assert!(providers.is_demo_mode(BackendKind::S3Compatible));
        assert!(!providers.strict_mode());
    }

    #[test]
    fn test_configured_from_environment_map() {
        let settings = UploadSettings::from_source(HashMap::from([
            ("GATHERLY__UPLOADS__CDN__API_KEY".to_string(), "secret".to_string()),
            ("GATHERLY__UPLOADS__CDN__ACCOUNT_ID".to_string(), "acct".to_string()),
        ]))
        .expect("settings");
        let providers = UploadProviders::from_settings(&settings);

        let statuses = providers.statuses();
        assert_eq!(
            statuses,
            vec![
                ProviderStatus {
                    kind: BackendKind::Cdn,
                    configured: true,
                    demo_mode: false
                },
                ProviderStatus {
                    kind: BackendKind::S3Compatible,
                    configured: false,
                    demo_mode: true
                },
            ]
        );
        assert_eq!(providers.backend(BackendKind::Cdn).kind(), BackendKind::Cdn);
    }

    #[test]
    fn test_api_key_alone_configures_cdn() {
        let settings = UploadSettings::from_source(HashMap::from([(
            "GATHERLY__UPLOADS__CDN__API_KEY".to_string(),
            "secret_W142hJD1234567890".to_string(),
        )]))
        .expect("settings");
        let providers = UploadProviders::from_settings(&settings);

        assert!(providers.is_configured(BackendKind::Cdn));
        assert!(!providers.is_demo_mode(BackendKind::Cdn));
        assert_eq!(
            crate::backend::CdnConfig::from_settings(&settings.cdn).map(|c| c.account_id),
            Some("W142hJD".to_string())
        );
    }
}
