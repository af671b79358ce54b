use crate::models::StoredObject;
use crate::services::endpoint_pool::EndpointPool;
use crate::services::storage::{ObjectBody, ObjectStore, StoreError};
use crate::utils::content_type::{SNIFF_LEN, sniff};
use crate::utils::range::{ByteRange, parse_range};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncReadExt, Take};
use tokio_util::io::ReaderStream;

/// Chunk size used when copying an object to the client.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("object `{0}` has expired")]
    Expired(String),

    #[error("range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Object metadata with its content type settled.
#[derive(Debug, Clone)]
pub struct ResolvedObject {
    pub object: StoredObject,
    pub content_type: String,
}

pub enum Download {
    NotModified(ResolvedObject),
    Content(ObjectStream),
}

/// Body and framing of a 200 or 206 response.
pub struct ObjectStream {
    pub resolved: ResolvedObject,
    pub range: ByteRange,
    /// True when the client asked for a range, i.e. the response is a 206.
    pub partial: bool,
    pub body: RangeBody,
}

/// Streams exactly one range of an object.
///
/// Owns the store reader: dropping the body, including when the client
/// disconnects mid-transfer, closes the backing connection.
pub struct RangeBody {
    inner: ReaderStream<Take<ObjectBody>>,
    id: String,
    expected: u64,
    sent: u64,
    done: bool,
}

impl RangeBody {
    pub fn new(id: &str, reader: ObjectBody, length: u64) -> Self {
        Self {
            inner: ReaderStream::with_capacity(reader.take(length), STREAM_CHUNK_SIZE),
            id: id.to_string(),
            expected: length,
            sent: 0,
            done: false,
        }
    }

    pub fn empty(id: &str) -> Self {
        Self::new(id, Box::pin(tokio::io::empty()), 0)
    }
}

impl Stream for RangeBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.done = true;
                tracing::error!("Read of {} failed after {} bytes: {}", self.id, self.sent, e);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.done = true;
                if self.sent < self.expected {
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "object {} ended after {} of {} bytes",
                            self.id, self.sent, self.expected
                        ),
                    ))));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RangeBody {
    fn drop(&mut self) {
        if self.sent < self.expected {
            tracing::debug!(
                "📉 Stream of {} closed after {}/{} bytes",
                self.id,
                self.sent,
                self.expected
            );
        }
    }
}

/// `If-None-Match` evaluation: `*`, lists and weak validators are accepted.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    fn opaque(tag: &str) -> &str {
        let tag = tag.trim();
        tag.strip_prefix("W/").unwrap_or(tag).trim_matches('"')
    }

    let etag = opaque(etag);
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || opaque(candidate) == etag)
}

pub struct DownloadService {
    pool: Arc<EndpointPool>,
}

impl DownloadService {
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self { pool }
    }

    /// Metadata of a live object, as served for `HEAD`.
    pub async fn head(&self, id: &str) -> Result<ResolvedObject, DownloadError> {
        let store = self.pool.current_client();
        self.resolve(&store, id).await
    }

    pub async fn get(
        &self,
        id: &str,
        range_header: Option<&str>,
        if_none_match: Option<&str>,
    ) -> Result<Download, DownloadError> {
        let store = self.pool.current_client();
        let resolved = self.resolve(&store, id).await?;

        if let (Some(candidate), Some(etag)) = (if_none_match, resolved.object.etag.as_deref()) {
            if etag_matches(candidate, etag) {
                return Ok(Download::NotModified(resolved));
            }
        }

        let size = resolved.object.size;
        let (range, partial) = match range_header {
            None => (ByteRange::full(size), false),
            Some(header) => {
                let range = parse_range(header, size).map_err(|e| {
                    tracing::debug!("Rejected range {:?} for {}: {}", header, id, e);
                    DownloadError::RangeNotSatisfiable { size }
                })?;
                (range, true)
            }
        };

        let body = if range.length == 0 {
            RangeBody::empty(id)
        } else {
            let reader = store.get_object_range(id, range).await?;
            RangeBody::new(id, reader, range.length)
        };

        Ok(Download::Content(ObjectStream {
            resolved,
            range,
            partial,
            body,
        }))
    }

    async fn resolve(
        &self,
        store: &Arc<dyn ObjectStore>,
        id: &str,
    ) -> Result<ResolvedObject, DownloadError> {
        let object = store
            .stat_object(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))?;

        if object.is_expired_at(Utc::now()) {
            spawn_expired_delete(store.clone(), id);
            return Err(DownloadError::Expired(id.to_string()));
        }

        let content_type = match object.content_type.as_deref() {
            Some(stored) if !stored.is_empty() => stored.to_string(),
            _ => sniff_stored(store.as_ref(), &object).await?,
        };

        Ok(ResolvedObject {
            object,
            content_type,
        })
    }
}

/// Detects the type of an object stored without one, from its first bytes only.
async fn sniff_stored(store: &dyn ObjectStore, object: &StoredObject) -> Result<String, StoreError> {
    let length = object.size.min(SNIFF_LEN as u64);
    if length == 0 {
        return Ok(sniff(&[]));
    }

    let reader = store
        .get_object_range(&object.id, ByteRange { start: 0, length })
        .await?;
    let mut head = Vec::with_capacity(length as usize);
    reader.take(length).read_to_end(&mut head).await?;
    Ok(sniff(&head))
}

/// Best-effort removal of an expired object; never affects the response.
fn spawn_expired_delete(store: Arc<dyn ObjectStore>, id: &str) {
    let id = id.to_string();
    tokio::spawn(async move {
        match store.delete_object(&id).await {
            Ok(()) => tracing::info!("🗑️  Deleted expired object {}", id),
            Err(e) => tracing::warn!("Failed to delete expired object {}: {}", id, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn collect(mut body: RangeBody) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_range_body_stops_at_length() {
        let reader: ObjectBody = Box::pin(&b"0123456789"[..]);
        let body = RangeBody::new("obj", reader, 4);
        assert_eq!(collect(body).await.unwrap(), b"0123");
    }

    #[tokio::test]
    async fn test_range_body_reports_short_object() {
        let reader: ObjectBody = Box::pin(&b"012"[..]);
        let body = RangeBody::new("obj", reader, 10);
        let err = collect(body).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    struct TrackedReader {
        data: std::io::Cursor<Vec<u8>>,
        dropped: Arc<AtomicBool>,
    }

    impl tokio::io::AsyncRead for TrackedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            tokio::io::AsyncRead::poll_read(Pin::new(&mut self.data), cx, buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_body_mid_stream_releases_reader() {
        let dropped = Arc::new(AtomicBool::new(false));
        let length = (STREAM_CHUNK_SIZE * 4) as u64;
        let reader: ObjectBody = Box::pin(TrackedReader {
            data: std::io::Cursor::new(vec![1u8; length as usize]),
            dropped: dropped.clone(),
        });

        let mut body = RangeBody::new("obj", reader, length);
        let first = body.next().await.unwrap().unwrap();
        assert!((first.len() as u64) < length);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(body);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_range_body() {
        assert!(collect(RangeBody::empty("obj")).await.unwrap().is_empty());
    }

    #[test]
    fn test_etag_matches() {
        assert!(etag_matches("\"abc\"", "\"abc\""));
        assert!(etag_matches("abc", "\"abc\""));
        assert!(etag_matches("W/\"abc\"", "\"abc\""));
        assert!(etag_matches("\"x\", \"abc\"", "\"abc\""));
        assert!(etag_matches("*", "\"abc\""));
        assert!(!etag_matches("\"abd\"", "\"abc\""));
        assert!(!etag_matches("", "\"abc\""));
    }
}
