use axum::{Json, extract::State, response::IntoResponse};
use tracing::warn;

use crate::AppState;
use crate::metrics;

/// Service banner
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to clinic application" }))
}

/// Health check endpoint - returns router status and who is online
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    let participants = match state.router.stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Router stats unavailable: {}", e);
            None
        }
    };

    let status = if participants.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        participants,
        connections: snapshot.connections.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}
