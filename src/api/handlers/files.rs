use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadReceipt;
use crate::services::download_service::{Download, ResolvedObject};
use crate::services::upload_service::{UploadRequest, stage};
use crate::utils::content_type::content_disposition;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart field carrying the uploaded payload.
pub const FILE_FIELD: &str = "file";

/// Optional request header overriding the multipart file name.
pub const FILENAME_HEADER: &str = "filename";

/// Singular spelling sent alongside `Accept-Ranges` for older clients.
pub const ACCEPT_RANGE_HEADER: &str = "accept-range";

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn upload_request(headers: &HeaderMap) -> Result<UploadRequest, AppError> {
    let expires = header_str(headers, header::EXPIRES)
        .map(|text| {
            text.parse::<i64>()
                .map_err(|_| AppError::BadRequest("Expires must be a unix timestamp".to_string()))
        })
        .transpose()?;

    let filename = headers
        .get(FILENAME_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
        .unwrap_or_default();

    Ok(UploadRequest {
        filename,
        authorization: header_str(headers, header::AUTHORIZATION).map(str::to_string),
        expires,
    })
}

#[utoipa::path(
    post,
    path = "/",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    params(
        ("Authorization" = Option<String>, Header, description = "`Bearer <admin token>`, required to choose the expiration"),
        ("Expires" = Option<i64>, Header, description = "Requested expiration in unix seconds, 0 for none (admin only)"),
        ("Filename" = Option<String>, Header, description = "Overrides the multipart file name")
    ),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadReceipt),
        (status = 400, description = "Missing file field or malformed request"),
        (status = 413, description = "Request body too large")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, AppError> {
    let result: Result<Json<UploadReceipt>, AppError> = async {
        let mut request = upload_request(&headers)?;
        let mut staged = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(AppError::from_multipart)?
        {
            if field.name() != Some(FILE_FIELD) {
                continue;
            }
            if request.filename.is_empty() {
                request.filename = field.file_name().unwrap_or_default().to_string();
            }

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            staged = Some(stage(reader).await.map_err(AppError::from_staging)?);
            break;
        }

        let staged = staged.ok_or(AppError::BadRequest("No file provided".to_string()))?;
        let receipt = state.upload_service.upload(staged, request).await?;
        Ok(Json(receipt))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Unread request bodies make browsers report a network error instead of our status.
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

/// Headers shared by `GET` and `HEAD` responses.
fn object_headers(headers: &mut HeaderMap, resolved: &ResolvedObject, content_length: u64) {
    let object = &resolved.object;
    let filename = object.filename.as_deref().unwrap_or(&object.id);

    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(ACCEPT_RANGE_HEADER, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if let Ok(h_val) = HeaderValue::from_str(&resolved.content_type) {
        headers.insert(header::CONTENT_TYPE, h_val);
    }

    if let Ok(h_val) =
        HeaderValue::from_str(&content_disposition(filename, &resolved.content_type))
    {
        headers.insert(header::CONTENT_DISPOSITION, h_val);
    }

    if object.expires_at != 0 {
        headers.insert(header::EXPIRES, HeaderValue::from(object.expires_at));
    }

    insert_validators(headers, resolved);
}

fn insert_validators(headers: &mut HeaderMap, resolved: &ResolvedObject) {
    if let Some(h_val) = resolved.object.etag.as_deref().and_then(|t| t.parse().ok()) {
        headers.insert(header::ETAG, h_val);
    }

    if let Some(last_modified) = resolved.object.last_modified {
        let rfc1123 = last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(h_val) = rfc1123.parse() {
            headers.insert(header::LAST_MODIFIED, h_val);
        }
    }
}

#[utoipa::path(
    get,
    path = "/{id}",
    params(
        ("id" = String, Path, description = "Identifier returned by the upload"),
        ("Range" = Option<String>, Header, description = "Single byte range, e.g. `bytes=0-1023`"),
        ("If-None-Match" = Option<String>, Header, description = "ETag of a cached copy")
    ),
    responses(
        (status = 200, description = "Full file stream"),
        (status = 206, description = "Partial file stream"),
        (status = 304, description = "Cached copy is current"),
        (status = 404, description = "File not found"),
        (status = 410, description = "File expired"),
        (status = 416, description = "Range not satisfiable")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = header_str(&headers, header::RANGE);
    let if_none_match = header_str(&headers, header::IF_NONE_MATCH);

    match state.download_service.get(&id, range, if_none_match).await? {
        Download::NotModified(resolved) => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            insert_validators(response.headers_mut(), &resolved);
            Ok(response)
        }
        Download::Content(stream) => {
            let mut response = Response::new(Body::from_stream(stream.body));
            object_headers(response.headers_mut(), &stream.resolved, stream.range.length);

            if stream.partial {
                *response.status_mut() = StatusCode::PARTIAL_CONTENT;
                let content_range = stream.range.content_range(stream.resolved.object.size);
                if let Ok(h_val) = HeaderValue::from_str(&content_range) {
                    response.headers_mut().insert(header::CONTENT_RANGE, h_val);
                }
            }

            Ok(response)
        }
    }
}

#[utoipa::path(
    head,
    path = "/{id}",
    params(
        ("id" = String, Path, description = "Identifier returned by the upload")
    ),
    responses(
        (status = 200, description = "File metadata"),
        (status = 404, description = "File not found"),
        (status = 410, description = "File expired")
    ),
    tag = "files"
)]
pub async fn head_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let resolved = state.download_service.head(&id).await?;

    let mut response = Response::new(Body::empty());
    object_headers(response.headers_mut(), &resolved, resolved.object.size);
    Ok(response)
}
