use crate::models::{ObjectMetadata, StoredObject};
use crate::utils::range::ByteRange;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

pub const META_FILENAME: &str = "filename";
pub const META_EXPIRES: &str = "expires";

/// Body of a ranged read. Dropping it releases the underlying connection.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store request failed: {0}")]
    Request(String),

    #[error("staged file unreadable: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn request(err: impl std::fmt::Display) -> Self {
        Self::Request(err.to_string())
    }
}

/// The operations the gateway needs from one object-store backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Cheap, side-effect-free round trip used for latency measurement.
    async fn probe(&self) -> Result<(), StoreError>;

    /// Writes the file at `source` under `key`. Returns the store's etag when it reports one.
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<Option<String>, StoreError>;

    /// `Ok(None)` when no object exists under `key`.
    async fn stat_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Opens a reader over exactly `range`. `range` must be non-empty.
    async fn get_object_range(&self, key: &str, range: ByteRange)
    -> Result<ObjectBody, StoreError>;

    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}

pub fn encode_metadata(metadata: &ObjectMetadata) -> HashMap<String, String> {
    HashMap::from([
        (
            META_FILENAME.to_string(),
            utf8_percent_encode(&metadata.filename, NON_ALPHANUMERIC).to_string(),
        ),
        (META_EXPIRES.to_string(), metadata.expires_at.to_string()),
    ])
}

/// Returns `(filename, expires_at)` from stored user metadata.
/// Missing or unparsable expiration reads as "never".
pub fn decode_metadata(metadata: &HashMap<String, String>) -> (Option<String>, i64) {
    let filename = metadata
        .get(META_FILENAME)
        .map(|v| percent_decode_str(v).decode_utf8_lossy().into_owned());
    let expires_at = metadata
        .get(META_EXPIRES)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    (filename, expires_at)
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn probe(&self) -> Result<(), StoreError> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StoreError::request(DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<Option<String>, StoreError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(StoreError::request)?;

        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(size as i64)
            .content_type(&metadata.content_type)
            .set_metadata(Some(encode_metadata(metadata)))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    "S3 put_object failed: bucket={}, key={}, error={}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                );
                StoreError::request(DisplayErrorContext(&e))
            })?;

        Ok(res.e_tag)
    }

    async fn stat_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Ok(None);
                }
                return Err(StoreError::request(DisplayErrorContext(&e)));
            }
        };

        let (filename, expires_at) = res
            .metadata
            .as_ref()
            .map(decode_metadata)
            .unwrap_or((None, 0));

        let last_modified = res.last_modified.and_then(|d| {
            chrono::DateTime::from_timestamp(d.secs(), d.subsec_nanos())
        });

        Ok(Some(StoredObject {
            id: key.to_string(),
            filename,
            content_type: res.content_type,
            size: res.content_length.unwrap_or(0).max(0) as u64,
            expires_at,
            etag: res.e_tag,
            last_modified,
        }))
    }

    async fn get_object_range(
        &self,
        key: &str,
        range: ByteRange,
    ) -> Result<ObjectBody, StoreError> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range.to_request_header())
            .send()
            .await
            .map_err(|e| StoreError::request(DisplayErrorContext(&e)))?;

        Ok(Box::pin(res.body.into_async_read()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::request(DisplayErrorContext(&e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_survives_non_ascii_filename() {
        let metadata = ObjectMetadata {
            filename: "カラオケ night.mkv".to_string(),
            content_type: "video/x-matroska".to_string(),
            expires_at: 1_700_000_000,
        };

        let encoded = encode_metadata(&metadata);
        assert!(encoded[META_FILENAME].is_ascii());

        let (filename, expires_at) = decode_metadata(&encoded);
        assert_eq!(filename.as_deref(), Some("カラオケ night.mkv"));
        assert_eq!(expires_at, 1_700_000_000);
    }

    #[test]
    fn test_missing_expiration_means_never() {
        let (filename, expires_at) = decode_metadata(&HashMap::new());
        assert!(filename.is_none());
        assert_eq!(expires_at, 0);
    }
}
