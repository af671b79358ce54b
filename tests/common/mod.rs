#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use producer::config::ProducerConfig;
use producer::models::{ObjectMetadata, StoredObject};
use producer::services::endpoint_pool::{Endpoint, EndpointPool, ProbeSettings};
use producer::services::storage::{ObjectBody, ObjectStore, StoreError};
use producer::utils::range::ByteRange;
use producer::{AppState, create_app};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const BOUNDARY: &str = "producer-test-boundary";

#[derive(Clone)]
pub struct MockObject {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub expires_at: i64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// In-memory object store keyed like a bucket.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, MockObject>>,
    deleted: Mutex<Vec<String>>,
    range_reads: AtomicUsize,
    fail_puts: AtomicBool,
    put_sources: Mutex<Vec<PathBuf>>,
}

impl MockObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Places an object directly, bypassing the upload path.
    pub fn insert(
        &self,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
        expires_at: i64,
    ) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MockObject {
                data: data.to_vec(),
                filename: None,
                content_type: content_type.map(str::to_string),
                expires_at,
                etag: format!("\"{:08x}\"", crc32fast::hash(data)),
                last_modified: Utc::now(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<MockObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn range_reads(&self) -> usize {
        self.range_reads.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `put_object` fail after reading nothing.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Staging paths handed to `put_object`, in call order.
    pub fn put_sources(&self) -> Vec<PathBuf> {
        self.put_sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<Option<String>, StoreError> {
        self.put_sources.lock().unwrap().push(source.to_owned());
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::request("SlowDown"));
        }

        let data = tokio::fs::read(source).await?;
        assert_eq!(data.len() as u64, size, "declared size must match staged file");

        let etag = format!("\"{:08x}\"", crc32fast::hash(&data));
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MockObject {
                data,
                filename: Some(metadata.filename.clone()),
                content_type: Some(metadata.content_type.clone()),
                expires_at: metadata.expires_at,
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(Some(etag))
    }

    async fn stat_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.object(key).map(|o| StoredObject {
            id: key.to_string(),
            filename: o.filename,
            content_type: o.content_type,
            size: o.data.len() as u64,
            expires_at: o.expires_at,
            etag: Some(o.etag),
            last_modified: Some(o.last_modified),
        }))
    }

    async fn get_object_range(
        &self,
        key: &str,
        range: ByteRange,
    ) -> Result<ObjectBody, StoreError> {
        self.range_reads.fetch_add(1, Ordering::SeqCst);
        let object = self
            .object(key)
            .ok_or_else(|| StoreError::request("NoSuchKey"))?;

        let start = range.start as usize;
        let end = (start + range.length as usize).min(object.data.len());
        let slice = object.data[start..end].to_vec();
        Ok(Box::pin(std::io::Cursor::new(slice)))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config() -> ProducerConfig {
    let mut config = ProducerConfig::development();
    config.upload.admin_token = ADMIN_TOKEN.to_string();
    config
}

pub async fn test_app_with(store: Arc<MockObjectStore>, config: ProducerConfig) -> Router {
    init_tracing();
    let pool = EndpointPool::connect(
        vec![Endpoint::new("mock", store)],
        ProbeSettings::from(&config.s3),
    )
    .await
    .unwrap();
    create_app(AppState::new(Arc::new(pool), config))
}

pub async fn test_app(store: Arc<MockObjectStore>) -> Router {
    test_app_with(store, test_config()).await
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Posts `data` as the `file` field; `headers` are added verbatim.
pub async fn upload(
    app: &Router,
    filename: &str,
    data: &[u8],
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let response = app
        .clone()
        .oneshot(
            builder
                .body(Body::from(multipart_body("file", filename, data)))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

pub async fn send(app: &Router, method: &str, uri: &str, headers: &[(&str, &str)]) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub fn header<'a>(response: &'a axum::response::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
