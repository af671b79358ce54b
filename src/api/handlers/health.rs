use crate::AppState;
use crate::models::EndpointHealth;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub current_endpoint: String,
    pub endpoints: Vec<EndpointHealth>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Gateway status and latest endpoint probe results", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.pool.health();
    let status = if endpoints.iter().any(|e| e.reachable) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        current_endpoint: state.pool.current_address(),
        endpoints,
    })
}
