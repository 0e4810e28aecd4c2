//! Generate Handler - 流式返回 WAV

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
};
use futures_util::{stream, StreamExt};
use std::sync::Arc;

use crate::application::{StreamAudioCommand, StreamAudioStarted};
use crate::infrastructure::http::dto::GenerateAudioParams;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 请求 ID 响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// 采样率响应头
pub const SAMPLE_RATE_HEADER: &str = "x-sample-rate";

/// 生成音频并边生成边返回
///
/// 第一块音频到达前失败时返回 JSON 错误；之后的失败以中断连接的方式结束响应体。
/// 响应结束后生成和保存仍在后台完成，结果通过状态接口和 WebSocket 查询。
pub async fn generate_audio(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerateAudioParams>,
) -> Result<Response, ApiError> {
    let StreamAudioStarted {
        request_id,
        content_type,
        sample_rate,
        mut live,
        ..
    } = state.stream_audio_handler.handle(StreamAudioCommand {
        request_id: params.uuid,
        prompt: params.prompt,
        duration_secs: params.duration,
        seed: params.seed,
    })?;

    let first: Bytes = match live.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => {
            return Err(ApiError::ServiceUnavailable(e.to_string()));
        }
        None => {
            return Err(ApiError::Internal(
                "generation ended without producing audio".to_string(),
            ));
        }
    };

    tracing::info!(
        request_id = %request_id,
        first_chunk_bytes = first.len(),
        "Streaming audio to client"
    );

    let rest = stream::unfold(live, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let body = Body::from_stream(stream::once(async move { Ok::<_, std::io::Error>(first) }).chain(rest));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(REQUEST_ID_HEADER, request_id.as_str())
        .header(SAMPLE_RATE_HEADER, sample_rate)
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}
