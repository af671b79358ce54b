pub mod api;
pub mod cli;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::error::AppError;
use crate::api::handlers::{files, health};
use crate::api::middleware::access_log::access_log_middleware;
use crate::config::ProducerConfig;
use crate::services::download_service::DownloadService;
use crate::services::endpoint_pool::EndpointPool;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        files::upload_file,
        files::download_file,
        files::head_file,
        health::health_check,
    ),
    components(
        schemas(
            files::UploadForm,
            health::HealthResponse,
            models::UploadReceipt,
            models::EndpointHealth,
        )
    ),
    tags(
        (name = "files", description = "Upload and download endpoints"),
        (name = "system", description = "Gateway status")
    )
)]
pub struct ApiDoc;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "producer=info,tower_http=info";

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<EndpointPool>,
    pub upload_service: Arc<UploadService>,
    pub download_service: Arc<DownloadService>,
    pub config: ProducerConfig,
}

impl AppState {
    pub fn new(pool: Arc<EndpointPool>, config: ProducerConfig) -> Self {
        Self {
            upload_service: Arc::new(UploadService::new(pool.clone(), config.upload.clone())),
            download_service: Arc::new(DownloadService::new(pool.clone())),
            pool,
            config,
        }
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    AppError::Internal(format!("handler panicked: {}", detail)).into_response()
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.upload.body_limit;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route(
            "/",
            post(files::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/:id", get(files::download_file).head(files::head_file))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn(access_log_middleware))
        .with_state(state)
}
