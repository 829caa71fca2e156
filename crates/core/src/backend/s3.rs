//! S3-compatible bucket adapter built on Apache OpenDAL.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::TryStreamExt;
use gatherly_shared::S3Settings;
use opendal::{EntryMode, Operator, services};
use reqwest::Url;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::UploadBackend;
use crate::upload::{
    BackendKind, ObjectMetadata, SelectedFile, StoredObject, UploadDestination, UploadError,
    file_extension,
};

/// Live credentials for an S3-compatible service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// S3 endpoint URL.
    pub endpoint: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Default bucket, used when a destination names none.
    pub bucket: Option<String>,
    /// Region.
    pub region: String,
}

impl S3Config {
    /// Default presigned download URL TTL: 1 hour.
    pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

    /// Resolve from settings. Returns `None` unless endpoint and both keys are set.
    #[must_use]
    pub fn from_settings(settings: &S3Settings) -> Option<Self> {
        let endpoint = non_empty(settings.endpoint.as_deref())?;
        let access_key_id = non_empty(settings.access_key_id.as_deref())?;
        let secret_access_key = non_empty(settings.secret_access_key.as_deref())?;

        Some(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            bucket: non_empty(settings.bucket.as_deref()).map(String::from),
            region: settings.region.clone(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Canned access marker stored with an object.
///
/// The marker is written as `x-amz-meta-acl` user metadata, which does not
/// change the object's ACL. Objects in a private bucket stay private and
/// their virtual-hosted URL answers 403; use [`S3Backend::presign_read`]
/// for those, or make the bucket public.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectAcl {
    /// Anyone may read the object.
    PublicRead,
}

impl ObjectAcl {
    /// Canned ACL name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicRead => "public-read",
        }
    }
}

/// Request to store one object.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    /// Target bucket.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object contents.
    pub body: Bytes,
    /// Content type.
    pub content_type: String,
    /// Optional access marker.
    pub acl: Option<ObjectAcl>,
}

/// Result of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Virtual-hosted URL of the object.
    pub location: String,
    /// Object key.
    pub key: String,
}

/// Generate the storage key for an uploaded file.
///
/// Without an explicit name the key is `{millis}_{random}{.ext}` so two users
/// uploading `photo.jpg` at the same time never overwrite each other.
/// Format: `{folder}/{name}` when a folder is given.
#[must_use]
pub fn generate_object_key(folder: Option<&str>, original_name: &str, explicit_name: Option<&str>) -> String {
    let name = explicit_name.map_or_else(
        || {
            let timestamp = Utc::now().timestamp_millis();
            let random = Uuid::new_v4().simple().to_string();
            let suffix = &random[..13];
            match file_extension(original_name) {
                Some(ext) => format!("{timestamp}_{suffix}.{ext}"),
                None => format!("{timestamp}_{suffix}"),
            }
        },
        ToString::to_string,
    );

    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{folder}/{name}"),
        None => name,
    }
}

/// Stores files in an S3-compatible service, one operator per bucket.
pub struct S3Backend {
    config: Option<S3Config>,
    operators: DashMap<String, Operator>,
}

impl S3Backend {
    /// Create a backend. `None` means demo mode.
    #[must_use]
    pub fn new(config: Option<S3Config>) -> Self {
        Self {
            config,
            operators: DashMap::new(),
        }
    }

    /// Create a backend from settings.
    #[must_use]
    pub fn from_settings(settings: &S3Settings) -> Self {
        Self::new(S3Config::from_settings(settings))
    }

    /// Resolved configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<&S3Config> {
        self.config.as_ref()
    }

    /// Bucket for a destination, falling back to the configured default.
    #[must_use]
    pub fn bucket_for<'a>(&'a self, destination: &'a UploadDestination) -> Option<&'a str> {
        destination
            .bucket()
            .or_else(|| self.config.as_ref().and_then(|c| c.bucket.as_deref()))
    }

    fn config_or_err(&self) -> Result<&S3Config, UploadError> {
        self.config.as_ref().ok_or(UploadError::NotConfigured)
    }

    /// OpenDAL operator for a bucket, created on first use.
    fn operator(&self, bucket: &str) -> Result<Operator, UploadError> {
        if bucket.is_empty() {
            return Err(UploadError::MissingBucket);
        }
        if let Some(op) = self.operators.get(bucket) {
            return Ok(op.clone());
        }

        let config = self.config_or_err()?;
        let builder = services::S3::default()
            .endpoint(&config.endpoint)
            .bucket(bucket)
            .access_key_id(&config.access_key_id)
            .secret_access_key(&config.secret_access_key)
            .region(&config.region);

        let op = Operator::new(builder)
            .map_err(|e| UploadError::Storage(e.to_string()))?
            .finish();

        debug!(bucket = %bucket, endpoint = %config.endpoint, "Created storage operator");
        self.operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }

    /// Public URL of an object: `{scheme}://{bucket}.{endpoint-host}/{key}`.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<String, UploadError> {
        let config = self.config_or_err()?;
        let mut url = Url::parse(&config.endpoint)
            .map_err(|e| UploadError::Storage(format!("invalid endpoint: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| UploadError::Storage("endpoint has no host".to_string()))?
            .to_string();

        url.set_host(Some(&format!("{bucket}.{host}")))
            .map_err(|e| UploadError::Storage(format!("invalid bucket host: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| UploadError::Storage("endpoint cannot be a base URL".to_string()))?
            .clear()
            .extend(key.split('/'));

        Ok(url.to_string())
    }

    /// Store one object.
    pub async fn put_object(&self, req: PutObjectRequest) -> Result<PutObjectOutput, UploadError> {
        let op = self.operator(&req.bucket)?;

        let mut write = op
            .write_with(&req.key, req.body)
            .content_type(&req.content_type);
        if let Some(acl) = req.acl {
            write = write.user_metadata([("acl".to_string(), acl.as_str().to_string())]);
        }
        write.await?;

        let location = self.object_url(&req.bucket, &req.key)?;
        info!(bucket = %req.bucket, key = %req.key, "Object stored");

        Ok(PutObjectOutput {
            location,
            key: req.key,
        })
    }

    /// Delete an object. Failures are logged and reported as `false`.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> bool {
        let result = match self.operator(bucket) {
            Ok(op) => op.delete(key).await.map_err(UploadError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(bucket = %bucket, key = %key, "Object deleted");
                true
            }
            Err(e) => {
                warn!(bucket = %bucket, key = %key, error = %e, "Failed to delete object");
                false
            }
        }
    }

    /// List up to `max_keys` objects under an optional prefix.
    ///
    /// Listing stops as soon as `max_keys` files have been seen.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: usize,
    ) -> Result<Vec<ObjectMetadata>, UploadError> {
        let op = self.operator(bucket)?;
        let mut lister = op
            .lister_with(prefix.unwrap_or_default())
            .recursive(true)
            .await?;

        let mut objects = Vec::new();
        while objects.len() < max_keys {
            let Some(entry) = lister.try_next().await? else {
                break;
            };
            let metadata = entry.metadata();
            if metadata.mode() != EntryMode::FILE {
                continue;
            }
            objects.push(ObjectMetadata {
                key: entry.path().to_string(),
                size: metadata.content_length(),
                content_type: metadata.content_type().map(String::from),
            });
        }
        Ok(objects)
    }

    /// Signed download URL for a private object.
    pub async fn presign_read(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, UploadError> {
        let op = self.operator(bucket)?;
        let presigned = op.presign_read(key, ttl).await?;
        Ok(presigned.uri().to_string())
    }
}

impl UploadBackend for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3Compatible
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
            self.config_or_err()?;
            let bucket = self
                .bucket_for(destination)
                .ok_or(UploadError::MissingBucket)?
                .to_string();

            let request = PutObjectRequest {
                key: generate_object_key(destination.folder(), &file.name, None),
                bucket,
                body: file.data.clone(),
                content_type: file.mime_type.clone(),
                acl: destination.make_public.then_some(ObjectAcl::PublicRead),
            };

            let output = self.put_object(request).await?;
            Ok(StoredObject {
                url: output.location,
                key: Some(output.key),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            endpoint: "https://nyc3.digitaloceanspaces.com".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket: Some("registrations".to_string()),
            region: "nyc3".to_string(),
        }
    }

    #[test]
    fn test_config_requires_endpoint_and_keys() {
        let mut settings = S3Settings::default();
        assert!(S3Config::from_settings(&settings).is_none());

        settings.endpoint = Some("https://nyc3.digitaloceanspaces.com/".into());
        settings.access_key_id = Some("key".into());
        assert!(S3Config::from_settings(&settings).is_none());

        settings.secret_access_key = Some("secret".into());
        let config = S3Config::from_settings(&settings).expect("configured");
        assert_eq!(config.endpoint, "https://nyc3.digitaloceanspaces.com");
        assert_eq!(config.bucket, None);
        assert_eq!(config.region, "nyc3");
    }

    #[test]
    fn test_generated_key_keeps_extension_not_name() {
        let key = generate_object_key(Some("events/photos"), "my photo.JPG", None);

        assert!(key.starts_with("events/photos/"));
        assert!(key.ends_with(".JPG"));
        assert!(!key.contains("my photo"));

        let name = key.rsplit('/').next().expect("has name");
        let (timestamp, rest) = name.split_once('_').expect("timestamp separator");
        assert!(timestamp.parse::<i64>().is_ok());
        assert_eq!(rest.len(), 13 + ".JPG".len());
    }

    #[test]
    fn test_generated_keys_do_not_collide() {
        let a = generate_object_key(None, "photo.png", None);
        let b = generate_object_key(None, "photo.png", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_explicit_name_is_used_verbatim() {
        assert_eq!(
            generate_object_key(Some("/docs/"), "x.pdf", Some("ticket.pdf")),
            "docs/ticket.pdf"
        );
        assert_eq!(generate_object_key(None, "x.pdf", Some("ticket.pdf")), "ticket.pdf");
    }

    #[test]
    fn test_extensionless_name_gets_no_dot() {
        let key = generate_object_key(None, "Makefile", None);
        assert!(!key.contains('.'));
    }

    #[test]
    fn test_object_url_is_virtual_hosted() {
        let backend = S3Backend::new(Some(config()));
        let url = backend
            .object_url("registrations", "events/1700000000000_abc.png")
            .expect("valid url");
        assert_eq!(
            url,
            "https://registrations.nyc3.digitaloceanspaces.com/events/1700000000000_abc.png"
        );
    }

    #[tokio::test]
    async fn test_presign_read_signs_locally() {
        let backend = S3Backend::new(Some(config()));
        let url = backend
            .presign_read("registrations", "events/a.png", Duration::from_secs(60))
            .await
            .expect("presign");

        assert!(url.contains("events/a.png"));
        assert!(url.contains("X-Amz-Signature"));
    }

    #[tokio::test]
    async fn test_presign_read_unconfigured() {
        let err = S3Backend::new(None)
            .presign_read("registrations", "a.png", S3Config::DEFAULT_PRESIGN_TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotConfigured));
    }

    #[test]
    fn test_bucket_falls_back_to_default() {
        let backend = S3Backend::new(Some(config()));
        let mut destination = UploadDestination::s3("", "events");
        assert_eq!(backend.bucket_for(&destination), Some("registrations"));

        destination.bucket = Some("speakers".into());
        assert_eq!(backend.bucket_for(&destination), Some("speakers"));
    }

    #[test]
    fn test_operators_are_cached_per_bucket() {
        let backend = S3Backend::new(Some(config()));
        backend.operator("a").expect("operator");
        backend.operator("a").expect("operator");
        backend.operator("b").expect("operator");
        assert_eq!(backend.operators.len(), 2);
    }

    #[tokio::test]
    async fn test_put_without_bucket_fails() {
        let mut cfg = config();
        cfg.bucket = None;
        let backend = S3Backend::new(Some(cfg));
        let file = SelectedFile::new("a.png", "image/png", vec![1]);

        let err = backend
            .put(&file, &UploadDestination::s3("", "events"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::MissingBucket));
        assert!(!err.is_credential_related());
    }

    #[tokio::test]
    async fn test_unconfigured_backend_refuses_operations() {
        let backend = S3Backend::new(None);
        let file = SelectedFile::new("a.png", "image/png", vec![1]);

        let err = backend
            .put(&file, &UploadDestination::s3("bucket", "events"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotConfigured));
        assert!(!backend.delete_object("bucket", "key").await);
        assert!(backend.list_objects("bucket", None, 10).await.is_err());
    }

    const LIST_PAGE_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>events</Name>
  <Prefix>photos/</Prefix>
  <KeyCount>3</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>page-2</NextContinuationToken>
  <Contents><Key>photos/a.png</Key><LastModified>2024-05-01T10:00:00.000Z</LastModified><ETag>"a"</ETag><Size>3</Size></Contents>
  <Contents><Key>photos/b.png</Key><LastModified>2024-05-01T10:00:00.000Z</LastModified><ETag>"b"</ETag><Size>4</Size></Contents>
  <Contents><Key>photos/c.png</Key><LastModified>2024-05-01T10:00:00.000Z</LastModified><ETag>"c"</ETag><Size>5</Size></Contents>
</ListBucketResult>"#;

    const LIST_PAGE_TWO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>events</Name>
  <Prefix>photos/</Prefix>
  <KeyCount>1</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>photos/d.png</Key><LastModified>2024-05-01T10:00:00.000Z</LastModified><ETag>"d"</ETag><Size>6</Size></Contents>
</ListBucketResult>"#;

    /// Two-page ListObjectsV2 endpoint counting the pages it served.
    async fn spawn_fake_bucket(pages: std::sync::Arc<std::sync::atomic::AtomicUsize>) -> String {
        use axum::{Router, extract::Query, http::header};
        use std::collections::HashMap;
        use std::sync::atomic::Ordering;

        let app = Router::new().fallback(move |Query(params): Query<HashMap<String, String>>| {
            let pages = std::sync::Arc::clone(&pages);
            async move {
                pages.fetch_add(1, Ordering::SeqCst);
                let body = if params.contains_key("continuation-token") {
                    LIST_PAGE_TWO
                } else {
                    LIST_PAGE_ONE
                };
                ([(header::CONTENT_TYPE, "application/xml")], body)
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake bucket");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_listing_stops_at_max_keys() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pages = std::sync::Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_fake_bucket(std::sync::Arc::clone(&pages)).await;
        let backend = S3Backend::new(Some(S3Config {
            endpoint,
            region: "us-east-1".to_string(),
            ..config()
        }));

        let objects = backend
            .list_objects("events", Some("photos/"), 2)
            .await
            .expect("list");
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["photos/a.png", "photos/b.png"]);
        assert_eq!(pages.load(Ordering::SeqCst), 1);

        let objects = backend
            .list_objects("events", Some("photos/"), 10)
            .await
            .expect("list");
        assert_eq!(objects.len(), 4);
        assert_eq!(objects[3].size, 6);
        assert_eq!(pages.load(Ordering::SeqCst), 3);
    }
}
