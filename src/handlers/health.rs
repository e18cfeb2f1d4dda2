use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Service status report
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub database: String,
    pub timestamp: String,
}

/// Liveness probe
///
/// The payment provider and the container runtime both poll this; the body is
/// a fixed plain-text `OK`.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive", body = String)),
    tag = "Health"
)]
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// Service status with a live database check
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses((status = 200, description = "Service status", body = StatusResponse)),
    tag = "Health"
)]
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => "up",
        Err(_) => "down",
    };

    Json(StatusResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        database: database.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
