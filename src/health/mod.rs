//! Health check endpoints
//!
//! `/health` answers while the process runs, `/ready` only while the
//! socket to the remote service is connected, `/metrics` renders
//! Prometheus text.

use crate::metrics::SyncMetrics;
use crate::shard::ShardStats;
use crate::socket::ConnectionManager;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub server_id: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub socket_state: &'static str,
    pub reconnect_attempts: u32,
    pub shards_total: usize,
    pub shards_failed: usize,
    pub shard_failures_total: u64,
    pub sessions_tracked: usize,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub server_id: String,
    pub connection: ConnectionManager,
    pub shard_stats: ShardStats,
    pub metrics: SyncMetrics,
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        server_id: state.server_id,
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (status, response) = readiness(&state);
    (status, Json(response))
}

/// Ready iff the socket is connected; shard health is informational.
pub fn readiness(state: &AppState) -> (StatusCode, ReadyResponse) {
    let ready = state.connection.is_connected();
    let response = ReadyResponse {
        ready,
        socket_state: state.connection.state().label(),
        reconnect_attempts: state.connection.reconnect_attempts(),
        shards_total: state.shard_stats.shard_count(),
        shards_failed: state.shard_stats.failed_shards(),
        shard_failures_total: state.shard_stats.total_failures(),
        sessions_tracked: state.shard_stats.total_sessions(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, response)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_socket_connected(state.connection.is_connected());

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
