//! Health, readiness and metrics endpoints (spec §2 ambient HTTP surface).

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Always-200 liveness probe: the process is running and responsive.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "screening-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: the engine's metrics registry is reachable, which in
/// practice means the composition root finished constructing successfully.
/// Concrete provider transports and a durable profile store are external
/// non-goals, so there is no outbound dependency to probe beyond that.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let metrics_enabled = state.metrics.registry().is_enabled();

    (
        StatusCode::OK,
        Json(json!({
            "ready": true,
            "checks": {
                "metrics": metrics_enabled,
            }
        })),
    )
}

/// Prometheus text exposition (spec §6 ambient metrics).
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.get_metrics(),
    )
}
