//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                         GET  健康检查
//! - /api/generate_audio               GET  生成音频（audio/x-wav 流式响应）
//! - /api/generation/status/{id}       GET  查询生成状态
//! - /ws/events                        WS   生成事件推送（可按 request_id 过滤）

use axum::{routing::get, Router};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/events", get(handlers::global_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/generate_audio", get(handlers::generate_audio))
        .route(
            "/generation/status/:request_id",
            get(handlers::get_generation_status),
        )
}
