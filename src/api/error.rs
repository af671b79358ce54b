use crate::services::download_service::DownloadError;
use crate::services::storage::StoreError;
use crate::services::upload_service::UploadError;
use crate::utils::range::unsatisfiable_content_range;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("File Expired")]
    Gone(String),

    #[error("Range Not Satisfiable")]
    RangeNotSatisfiable { size: u64 },

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Object store error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    /// Maps a failure of the inbound multipart stream to 400 or 413.
    pub fn from_multipart(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err.body_text())
        }
    }

    /// Staging reads the multipart field through an io adapter; client-side
    /// stream failures surface here wrapped in `io::Error`.
    pub fn from_staging(err: std::io::Error) -> Self {
        if !err
            .get_ref()
            .is_some_and(|inner| inner.is::<MultipartError>())
        {
            return AppError::Internal(format!("Staging failed: {}", err));
        }

        match err.into_inner().map(|inner| inner.downcast::<MultipartError>()) {
            Some(Ok(multipart)) => AppError::from_multipart(*multipart),
            _ => AppError::BadRequest("Malformed upload".to_string()),
        }
    }
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            DownloadError::Expired(_) => AppError::Gone("File expired".to_string()),
            DownloadError::RangeNotSatisfiable { size } => AppError::RangeNotSatisfiable { size },
            DownloadError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut content_range = None;

        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Gone(msg) => (StatusCode::GONE, msg),
            AppError::RangeNotSatisfiable { size } => {
                content_range = HeaderValue::from_str(&unsatisfiable_content_range(size)).ok();
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    "Range Not Satisfiable".to_string(),
                )
            }
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Object store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        let mut response = (status, body).into_response();
        if let Some(value) = content_range {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}
