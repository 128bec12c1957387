//! S3 adapter: aws-sdk-s3 client pointed at the bucket service's S3
//! interoperability endpoint, authenticated with an HMAC key pair.

use crate::cadapter::client::{ObjectBackend, ObjectInfo, ObjectListing};
use crate::config::{ConfigError, GcsfsConfig, HmacCredentials};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::info;

/// S3 backend configuration options
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint URL; the bucket service's interop endpoint by default.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Explicit HMAC key pair; falls back to the ambient AWS credential chain.
    pub credentials: Option<HmacCredentials>,
    pub enable_md5: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "auto".to_string(),
            endpoint: None,
            force_path_style: true,
            credentials: None,
            enable_md5: true,
        }
    }
}

impl S3Config {
    pub fn from_gcsfs(config: &GcsfsConfig) -> Result<Self, ConfigError> {
        let bucket = config
            .bucket()
            .ok_or_else(|| ConfigError::Invalid("no bucket configured".into()))?;
        Ok(Self {
            bucket,
            region: config.region.clone(),
            endpoint: Some(config.endpoint.clone()).filter(|e| !e.is_empty()),
            credentials: config.load_credentials()?,
            ..Default::default()
        })
    }
}

#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    config: S3Config,
}

impl S3Backend {
    pub async fn with_config(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(anyhow!("Bucket name cannot be empty"));
        }

        let mut builder = match &config.credentials {
            Some(creds) => aws_sdk_s3::config::Builder::new()
                .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    creds.access_key_id.clone(),
                    creds.secret_access_key.clone(),
                    None,
                    None,
                    "gcsfs-credential-file",
                )),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };
        builder = builder.region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(config.force_path_style);

        info!(bucket = %config.bucket, endpoint = ?config.endpoint, "S3 backend ready");
        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    fn md5_base64(data: &[u8]) -> String {
        let sum = md5::compute(data);
        B64.encode(sum.0)
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn put_object(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(data.to_vec()));
        if self.config.enable_md5 {
            req = req.content_md5(Self::md5_base64(data));
        }
        req.send().await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(o) => {
                let body = o.body.collect().await?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(o) => Ok(Some(ObjectInfo {
                size: o.content_length().unwrap_or_default().max(0) as u64,
                content_type: o.content_type().map(str::to_string),
                updated: o.last_modified().map(|t| t.secs()),
            })),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        let mut listing = ObjectListing::default();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix)
                .set_delimiter(delimiter.map(str::to_string))
                .set_continuation_token(token.take())
                .send()
                .await?;
            listing
                .keys
                .extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            listing.common_prefixes.extend(
                resp.common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(str::to_string)),
            );
            match resp.next_continuation_token() {
                Some(next) if resp.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(listing)
    }

    async fn has_prefix(&self, prefix: &str) -> Result<bool> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await?;
        Ok(!resp.contents().is_empty())
    }

    async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        let source = format!("{}/{}", self.config.bucket, urlencoding::encode(from));
        self.client
            .copy_object()
            .bucket(&self.config.bucket)
            .copy_source(source)
            .key(to)
            .send()
            .await?;
        Ok(())
    }
}
