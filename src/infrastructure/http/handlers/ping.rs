//! Ping Handler
//!
//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::infrastructure::http::state::AppState;

/// Ping 响应
#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub generator_healthy: bool,
    pub active_sessions: usize,
}

/// Ping endpoint - 健康检查
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let generator_healthy = state.generator.health_check().await;
    Json(PingResponse {
        status: if generator_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        generator_healthy,
        active_sessions: state.get_status_handler.active_count(),
    })
}
