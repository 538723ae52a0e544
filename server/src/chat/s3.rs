//! S3 Storage Client
//!
//! Hosts chat images in S3-compatible storage.
//! Supports any S3-compatible backend: AWS S3, MinIO, Backblaze B2, Cloudflare R2.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    config::{Credentials, IdentityCache, SharedCredentialsProvider, StalledStreamProtectionConfig},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::uploads::{decode_image, MediaUploader, UploadError};
use crate::config::Config;

/// S3 client wrapper with configuration.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    public_url: Option<String>,
    presign_expiry: Duration,
    max_upload_size: usize,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    ///
    /// Uses path-style addressing when a custom endpoint is configured.
    pub fn new(config: &Config) -> Self {
        let region = Region::new(
            std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .region(region)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .identity_cache(IdentityCache::no_cache());

        // Configure credentials from environment
        if let (Ok(access_key), Ok(secret_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "environment");
            s3_config_builder =
                s3_config_builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        // Configure custom endpoint for S3-compatible backends
        if let Some(endpoint) = &config.s3_endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and most S3-compatible backends
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.s3_bucket,
            endpoint = ?config.s3_endpoint,
            "S3 client initialized"
        );

        Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_url: config.s3_public_url.clone(),
            presign_expiry: Duration::from_secs(config.s3_presign_expiry.max(1) as u64),
            max_upload_size: config.max_upload_size,
        }
    }

    /// Store an object.
    pub async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), UploadError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Generate a presigned URL for downloading an object.
    pub async fn presign_get(&self, key: &str) -> Result<String, UploadError> {
        let presign_config = PresigningConfig::builder()
            .expires_in(self.presign_expiry)
            .build()
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Check if the bucket is accessible (health check).
    pub async fn health_check(&self) -> Result<(), UploadError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| UploadError::Storage(format!("Bucket not accessible: {e}")))?;

        Ok(())
    }

    /// Get the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl MediaUploader for S3Client {
    #[instrument(skip(self, image), fields(bucket = %self.bucket))]
    async fn upload(&self, image: &str) -> Result<String, UploadError> {
        let decoded = decode_image(image, self.max_upload_size)?;
        let key = format!("chat_images/{}.{}", Uuid::now_v7(), decoded.extension);

        self.put(&key, decoded.data, decoded.mime_type).await?;
        info!(key = %key, "Image uploaded");

        match &self.public_url {
            Some(base) => Ok(format!("{base}/{key}")),
            None => self.presign_get(&key).await,
        }
    }
}
