use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A stored object together with a freshly signed access URL
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// A time-limited access URL
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable byte storage port.
///
/// Access URLs are credentialed and time-limited; callers must regenerate
/// them on every read rather than cache them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a fresh key, returning the key and a signed URL
    async fn put(&self, bytes: &[u8], file_name: &str, content_type: &str)
        -> Result<StoredObject>;

    /// Generate a fresh signed URL for an existing key
    async fn presign(&self, key: &str) -> Result<SignedUrl>;

    /// Delete a stored object
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    key_prefix: String,
    url_expiry: Duration,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            url_expiry: Duration::from_secs(config.presigned_url_expiry_secs),
        })
    }

    /// Generate an object key: {prefix}/{uuid}-{file_name}
    fn generate_key(&self, file_name: &str) -> String {
        format!(
            "{}/{}-{}",
            self.key_prefix,
            Uuid::new_v4(),
            sanitize_file_name(file_name)
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(file_name = %file_name, size_bytes = bytes.len()))]
    async fn put(
        &self,
        bytes: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredObject> {
        let key = self.generate_key(file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload object to S3")?;

        debug!(key = %key, "Object uploaded");

        let signed = self.presign(&key).await?;

        Ok(StoredObject {
            key,
            url: signed.url,
        })
    }

    async fn presign(&self, key: &str) -> Result<SignedUrl> {
        let presigning_config = PresigningConfig::expires_in(self.url_expiry)
            .context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.url_expiry)
                .context("Presigned URL expiry out of range")?;

        Ok(SignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete object from S3")?;

        debug!("Object deleted");
        Ok(())
    }
}

/// Sanitize a file name for use in an object key
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Content type for a resolved image format
pub fn content_type_for_format(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("portrait.jpg"), "portrait.jpg");
        assert_eq!(sanitize_file_name("my photo.png"), "my_photo.png");
        assert_eq!(sanitize_file_name("a/b\\c.jpeg"), "a_b_c.jpeg");
    }

    #[test]
    fn test_content_type_for_format() {
        assert_eq!(content_type_for_format("jpeg"), "image/jpeg");
        assert_eq!(content_type_for_format("JPG"), "image/jpeg");
        assert_eq!(content_type_for_format("png"), "image/png");
        assert_eq!(content_type_for_format("tiff"), "application/octet-stream");
    }
}
