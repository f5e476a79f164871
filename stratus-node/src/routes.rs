//! Operational HTTP endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use stratus_agents::CoordinationSnapshot;
use stratus_core::ManagementServerId;
use stratus_storage::HostStore;

use crate::NodeMetrics;

#[derive(Clone)]
pub struct AppState {
    pub ms_id: ManagementServerId,
    pub store: Arc<dyn HostStore>,
    pub metrics: Arc<NodeMetrics>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    ms_id: ManagementServerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    ms_id: ManagementServerId,
    version: &'static str,
    coordination: CoordinationSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// GET /health: round trip to the store.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => {
            state.metrics.set_store_healthy(true);
            (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "ok",
                    ms_id: state.ms_id,
                    error: None,
                }),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.set_store_healthy(false);
            tracing::warn!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    ms_id: state.ms_id,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// GET /metrics: Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
                .into_response()
        }
    }
}

/// GET /status: coordination counters as JSON.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ms_id: state.ms_id,
        version: env!("CARGO_PKG_VERSION"),
        coordination: state.metrics.coordination().snapshot(),
    })
}
