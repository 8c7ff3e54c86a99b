use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::{BlobRef, BlobStore};
use crate::error::StorageError;

/// S3-backed implementation of [`BlobStore`].
///
/// The blob reference (optionally behind a key prefix) is used as the object
/// key within the bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3BlobStore {
    /// Create a new store for the given bucket.
    ///
    /// # Arguments
    /// * `client` - AWS S3 client to use for requests
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix, e.g. `"media"`
    pub fn new(client: Client, bucket: String, prefix: Option<String>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for a reference.
    pub fn key_for(&self, reference: &BlobRef) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, reference.as_str()),
            None => reference.as_str().to_string(),
        }
    }

    fn location(&self, reference: &BlobRef) -> String {
        format!("s3://{}/{}", self.bucket, self.key_for(reference))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn store(
        &self,
        namespace: &str,
        suggested_name: &str,
        data: Bytes,
    ) -> Result<BlobRef, StorageError> {
        let reference = BlobRef::generate(namespace, suggested_name);
        let len = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key_for(&reference))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        debug!(location = %self.location(&reference), bytes = len, "Stored blob");
        Ok(reference)
    }

    async fn retrieve(&self, reference: &BlobRef) -> Result<Bytes, StorageError> {
        if !reference.is_valid() {
            return Err(StorageError::NotFound(reference.to_string()));
        }

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(reference))
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    StorageError::NotFound(self.location(reference))
                } else {
                    StorageError::S3(e.to_string())
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn delete(&self, reference: &BlobRef) -> Result<(), StorageError> {
        // S3 DeleteObject succeeds for missing keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key_for(reference))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        debug!(location = %self.location(reference), "Deleted blob");
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("s3://{}/{}", self.bucket, prefix),
            None => format!("s3://{}", self.bucket),
        }
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
