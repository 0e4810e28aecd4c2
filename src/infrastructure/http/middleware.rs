//! HTTP Middleware
//!
//! 响应日志中间件：错误状态码与流式响应的首包延迟

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

use super::handlers::REQUEST_ID_HEADER;

/// 响应日志中间件
///
/// - 4xx / 5xx 记录告警或错误
/// - 流式音频响应记录请求 ID 和响应头发出前的等待时间（即首块音频的生成耗时）
///
/// 业务错误的详情在 `ApiError::into_response()` 中记录
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            elapsed_ms,
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            elapsed_ms,
            "HTTP client error"
        );
    } else if let Some(request_id) = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        tracing::info!(
            request_id = %request_id,
            uri = %uri,
            first_chunk_ms = elapsed_ms,
            "Audio stream started"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    async fn stream_handler() -> impl IntoResponse {
        ([(REQUEST_ID_HEADER, "job-1")], "RIFF")
    }

    async fn conflict_handler() -> StatusCode {
        StatusCode::CONFLICT
    }

    async fn unavailable_handler() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    fn create_test_router() -> Router {
        Router::new()
            .route("/stream", get(stream_handler))
            .route("/conflict", get(conflict_handler))
            .route("/unavailable", get(unavailable_handler))
            .layer(axum::middleware::from_fn(error_logging_middleware))
    }

    async fn call(uri: &str) -> Response {
        let request = HttpRequest::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        create_test_router().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_stream_response_passes_through() {
        let response = call("/stream").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "job-1");
    }

    #[tokio::test]
    async fn test_client_error_passes_through() {
        let response = call("/conflict").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_server_error_passes_through() {
        let response = call("/unavailable").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
