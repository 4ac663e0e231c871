use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    types::ObjectCannedAcl,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};

use crate::config::SpacesConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// URL clients use to fetch `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Object names are lowercased so lookups elsewhere never depend on case.
pub fn resolve_filename(name: &str, extension: &str) -> String {
    format!("{}{}", name.to_lowercase(), extension)
}

/// DigitalOcean Spaces, reached through the S3 API.
#[derive(Clone)]
pub struct SpacesStorage {
    client: Client,
    bucket: String,
    host: String,
}

impl SpacesStorage {
    pub async fn new(cfg: &SpacesConfig) -> anyhow::Result<Self> {
        let host = cfg
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        anyhow::ensure!(!host.is_empty(), "DO_ENDPOINT is empty");
        let endpoint_url = if cfg.endpoint.contains("://") {
            cfg.endpoint.clone()
        } else {
            format!("https://{}", host)
        };

        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&endpoint_url)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&endpoint_url)
            .build();

        info!(bucket = %cfg.bucket, endpoint = %endpoint_url, "spaces storage configured");
        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            host,
        })
    }
}

#[async_trait]
impl StorageClient for SpacesStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .with_context(|| format!("spaces put_object {}", key))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}.{}/{}", self.bucket, self.host, key)
    }
}

/// Used when Spaces is not configured: uploads are skipped and URLs point at
/// a local `/uploads/` path.
#[derive(Clone, Default)]
pub struct PlaceholderStorage;

#[async_trait]
impl StorageClient for PlaceholderStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        warn!(key, bytes = body.len(), "spaces not configured; upload skipped");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("/uploads/{}", key)
    }
}
