//! HTTP MusicGen Client - 调用外部推理服务
//!
//! 实现 MusicGeneratorPort，通过 HTTP 调用外部生成服务
//!
//! 外部生成 API:
//! POST {base_url}/generate
//! Request: {"prompt": "...", "max_new_tokens": 600, "seed": 0, "model": "..."}  (JSON)
//! Response: application/octet-stream，持续输出 f32 小端单声道 PCM

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{GenerationError, MusicGeneratorPort, SegmentSink};
use crate::domain::generation::{GenerationRequest, SegmentPlan};

const BYTES_PER_SAMPLE: usize = 4;

/// 生成请求体 (JSON)
#[derive(Debug, Serialize)]
struct GenerateHttpRequest<'a> {
    prompt: &'a str,
    max_new_tokens: usize,
    seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// HTTP 生成客户端配置
#[derive(Debug, Clone)]
pub struct HttpMusicGenClientConfig {
    /// 生成服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒），包含整个流式响应
    pub timeout_secs: u64,
    pub model_name: Option<String>,
    pub sample_rate: u32,
    pub frame_rate: u32,
}

impl Default for HttpMusicGenClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 600,
            model_name: None,
            sample_rate: 32000,
            frame_rate: 50,
        }
    }
}

impl HttpMusicGenClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_rates(mut self, sample_rate: u32, frame_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self.frame_rate = frame_rate;
        self
    }
}

/// HTTP 生成客户端
pub struct HttpMusicGenClient {
    client: Client,
    config: HttpMusicGenClientConfig,
}

impl HttpMusicGenClient {
    pub fn new(config: HttpMusicGenClientConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!("{}/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else if e.is_connect() {
        GenerationError::Network(format!("Cannot connect to generation service: {}", e))
    } else {
        GenerationError::Network(e.to_string())
    }
}

/// 从缓冲中取出所有完整的 f32 采样
fn drain_samples(raw: &mut BytesMut, out: &mut Vec<f32>) {
    while raw.remaining() >= BYTES_PER_SAMPLE {
        out.push(raw.get_f32_le());
    }
}

#[async_trait]
impl MusicGeneratorPort for HttpMusicGenClient {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn frame_rate(&self) -> u32 {
        self.config.frame_rate
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        plan: &SegmentPlan,
        sink: &mut SegmentSink,
    ) -> Result<(), GenerationError> {
        let body = GenerateHttpRequest {
            prompt: request.prompt().as_str(),
            max_new_tokens: plan.max_new_tokens(),
            seed: request.seed(),
            model: self.config.model_name.as_deref(),
        };

        tracing::debug!(
            url = %self.generate_url(),
            request_id = %request.request_id(),
            max_new_tokens = body.max_new_tokens,
            "Sending generation request"
        );

        let response = tokio::select! {
            _ = sink.cancellation().cancelled() => return Err(GenerationError::Cancelled),
            response = self.client.post(self.generate_url()).json(&body).send() => {
                response.map_err(map_reqwest_error)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Model(format!("HTTP {}: {}", status, error_text)));
        }

        let mut stream = response.bytes_stream();
        let mut raw = BytesMut::new();
        let mut pending: Vec<f32> = Vec::new();
        // 已交付的采样数
        let mut delivered_samples = 0usize;

        loop {
            let Some(wanted) = plan.segment_samples(sink.delivered()) else {
                // 规划内的分段已全部交付，多余的输出直接丢弃
                break;
            };

            if pending.len() >= wanted {
                let rest = pending.split_off(wanted);
                let segment = std::mem::replace(&mut pending, rest);
                delivered_samples += segment.len();
                sink.send(segment).await?;
                continue;
            }

            let chunk = tokio::select! {
                _ = sink.cancellation().cancelled() => return Err(GenerationError::Cancelled),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    raw.extend_from_slice(&bytes);
                    drain_samples(&mut raw, &mut pending);
                }
                Some(Err(e)) => return Err(map_reqwest_error(e)),
                None => {
                    if !raw.is_empty() {
                        return Err(GenerationError::InvalidResponse(format!(
                            "stream ended with {} dangling bytes",
                            raw.len()
                        )));
                    }
                    // 服务提前结束：剩余采样作为最后一段交付，然后报告截断
                    if !pending.is_empty() {
                        delivered_samples += pending.len();
                        sink.send(std::mem::take(&mut pending)).await?;
                    }
                    return Err(GenerationError::InvalidResponse(format!(
                        "stream ended after {} of {} samples",
                        delivered_samples,
                        plan.total_samples()
                    )));
                }
            }
        }

        tracing::info!(
            request_id = %request.request_id(),
            segments = sink.delivered(),
            "Generation stream finished"
        );
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
