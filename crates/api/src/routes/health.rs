//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::websocket::WebSocketStats;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: Status,
    pub version: &'static str,
    pub storage: Status,
    pub ai_enabled: bool,
    pub websocket: WebSocketStats,
}

/// Storage reachability plus live channel counters
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Storage health check failed");
            false
        }
    };
    let (code, status, storage) = if storage_ok {
        (StatusCode::OK, Status::Healthy, Status::Healthy)
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Status::Unhealthy,
            Status::Unhealthy,
        )
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            storage,
            ai_enabled: state.config.ai_endpoint_url.is_some(),
            websocket: state.ws_state.get_stats().await,
        }),
    )
}

/// Liveness probe
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: ready once storage answers
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
