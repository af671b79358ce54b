use crate::config::UploadConfig;
use crate::models::{ObjectMetadata, UploadReceipt};
use crate::services::endpoint_pool::EndpointPool;
use crate::services::storage::StoreError;
use crate::utils::auth::is_admin;
use crate::utils::content_type::{SNIFF_LEN, sniff};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Read size used while draining an upload into its staging file.
const STAGING_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// An upload fully drained to local disk.
///
/// The backing file is removed when this value is dropped, whichever way the
/// request ends.
pub struct StagedUpload {
    file: NamedTempFile,
    head: Vec<u8>,
    pub size: u64,
    pub crc32: u32,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Leading bytes kept in memory for content detection.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    fn release(self) {
        let path = self.file.path().to_owned();
        if let Err(e) = self.file.close() {
            tracing::warn!("Failed to remove staging file {:?}: {}", path, e);
        }
    }
}

/// Drains `reader` into a fresh staging file in fixed-size chunks while
/// computing a CRC32 of the same bytes.
pub async fn stage<R>(mut reader: R) -> Result<StagedUpload, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    let file = NamedTempFile::with_prefix("producer-")?;
    let mut writer = tokio::fs::File::from_std(file.reopen()?);

    let mut hasher = crc32fast::Hasher::new();
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut buffer = [0u8; STAGING_CHUNK_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        let chunk = &buffer[..n];
        hasher.update(chunk);
        if head.len() < SNIFF_LEN {
            let wanted = (SNIFF_LEN - head.len()).min(n);
            head.extend_from_slice(&chunk[..wanted]);
        }
        writer.write_all(chunk).await?;
        size += n as u64;
    }
    writer.flush().await?;

    Ok(StagedUpload {
        file,
        head,
        size,
        crc32: hasher.finalize(),
    })
}

/// Caller-supplied parameters of one upload.
#[derive(Debug, Default, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub authorization: Option<String>,
    /// Requested expiration in unix seconds, `0` for none.
    pub expires: Option<i64>,
}

/// Admins get the expiration they asked for, and no expiration when they ask
/// for nothing. Everyone else gets the default TTL.
pub fn resolve_expiration(
    config: &UploadConfig,
    request: &UploadRequest,
    now: DateTime<Utc>,
) -> i64 {
    let default = now.timestamp() + config.default_expiration_secs as i64;

    if is_admin(request.authorization.as_deref(), &config.admin_token) {
        request.expires.unwrap_or(0)
    } else {
        default
    }
}

pub struct UploadService {
    pool: Arc<EndpointPool>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(pool: Arc<EndpointPool>, config: UploadConfig) -> Self {
        Self { pool, config }
    }

    /// Writes a staged upload to the current endpoint and removes the staging file.
    pub async fn upload(
        &self,
        staged: StagedUpload,
        request: UploadRequest,
    ) -> Result<UploadReceipt, UploadError> {
        let id = Uuid::now_v7().to_string();
        let content_type = sniff(staged.head());
        let expires = resolve_expiration(&self.config, &request, Utc::now());

        let filename = if request.filename.is_empty() {
            id.clone()
        } else {
            request.filename
        };

        let metadata = ObjectMetadata {
            filename,
            content_type,
            expires_at: expires,
        };

        let store = self.pool.current_client();
        let etag = store
            .put_object(&id, staged.path(), staged.size, &metadata)
            .await?;

        tracing::info!(
            "📦 Stored {} ({} bytes, crc32={:08x}, type={}, etag={}, expires={})",
            id,
            staged.size,
            staged.crc32,
            metadata.content_type,
            etag.as_deref().unwrap_or("-"),
            expires
        );
        staged.release();

        Ok(UploadReceipt {
            url: format!("{}/{}", self.config.base_url, id),
            id,
            expires,
        })
    }
}
