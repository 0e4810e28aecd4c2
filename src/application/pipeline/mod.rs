//! 流式生成管线
//!
//! Segment Producer → Container Framer → Dual-Sink Forwarder → 直播 + Persistence Sink
//!
//! 一个请求对应一次 `StreamPipeline::run`，运行在与 HTTP 连接无关的任务上，
//! 客户端断开不会中断生成和持久化。

pub mod forwarder;
pub mod framer;
pub mod persistence;
pub mod producer;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{GenerationError, MusicGeneratorPort, SessionRegistryPort};
use crate::domain::generation::{
    GenerationDomainError, GenerationRequest, SegmentPlan, SessionSnapshot, SessionState,
    StreamSession,
};

pub use forwarder::{
    ChunkBuffer, DualSinkForwarder, ForwardOutcome, ForwarderConfig, LiveItem, LiveReceiver,
    LiveSender, TransportFailure,
};
pub use framer::{WavFramer, WavHeader, WAV_CONTENT_TYPE};
pub use persistence::{object_key, HeaderPolicy, PersistenceError, PersistenceSink};
pub use producer::{SegmentProducer, SegmentStream, MAX_QUEUE_CAPACITY};

/// 中止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    Deadline,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// 中止后如何处理已累积的音频
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    #[default]
    Discard,
    PersistPartial,
}

/// 推进会话状态并登记快照
///
/// 非法转换只记录错误，不中断管线
pub(crate) fn advance(
    session: &mut StreamSession,
    next: SessionState,
    registry: &dyn SessionRegistryPort,
) {
    match session.transition(next) {
        Ok(()) => registry.record(&session.snapshot()),
        Err(e) => tracing::error!(
            request_id = %session.request_id(),
            error = %e,
            "Rejected session transition"
        ),
    }
}

/// 管线参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// 生产者交接队列容量
    pub queue_capacity: usize,
    pub forwarder: ForwarderConfig,
    pub abort_policy: AbortPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 2,
            forwarder: ForwarderConfig::default(),
            abort_policy: AbortPolicy::Discard,
        }
    }
}

/// 请求的最终结果
#[derive(Debug)]
pub enum PipelineStatus {
    /// 已保存；`early_end` 不为空表示生成提前结束，只保存了部分音频
    Persisted {
        locator: String,
        early_end: Option<GenerationError>,
    },
    PersistFailed(String),
    /// 生成器在交付任何分段前失败
    ProducerFailed(GenerationError),
    /// 被取消或超时；按策略保存了部分音频时带存储位置
    Aborted {
        reason: AbortReason,
        locator: Option<String>,
    },
}

/// 一次运行的报告
#[derive(Debug)]
pub struct PipelineReport {
    pub snapshot: SessionSnapshot,
    pub status: PipelineStatus,
}

/// 流式生成管线
pub struct StreamPipeline {
    generator: Arc<dyn MusicGeneratorPort>,
    persistence: Arc<PersistenceSink>,
    registry: Arc<dyn SessionRegistryPort>,
    settings: PipelineSettings,
}

impl StreamPipeline {
    pub fn new(
        generator: Arc<dyn MusicGeneratorPort>,
        persistence: Arc<PersistenceSink>,
        registry: Arc<dyn SessionRegistryPort>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            persistence,
            registry,
            settings,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.generator.sample_rate()
    }

    /// 按生成器参数为请求制定分段规划
    pub fn plan(&self, request: &GenerationRequest) -> Result<SegmentPlan, GenerationDomainError> {
        SegmentPlan::for_request(
            request,
            self.generator.sample_rate(),
            self.generator.frame_rate(),
        )
    }

    /// 运行一个请求直到会话关闭
    ///
    /// `live` 为空时只生成并保存；`abort` 触发后停止生成
    pub async fn run(
        &self,
        request: GenerationRequest,
        plan: SegmentPlan,
        live: Option<LiveSender>,
        abort: CancellationToken,
    ) -> PipelineReport {
        let registry = self.registry.as_ref();
        let mut session = StreamSession::new(request.request_id().clone());
        registry.record(&session.snapshot());

        tracing::info!(
            request_id = %request.request_id(),
            duration_secs = request.target_duration_secs(),
            segments = plan.segment_count(),
            sample_rate = plan.sample_rate(),
            "Generation started"
        );

        let forwarder = DualSinkForwarder::new(
            WavFramer::new(plan.sample_rate()),
            self.settings.forwarder.clone(),
        );
        let mut segments = SegmentProducer::spawn(
            self.generator.clone(),
            request,
            plan,
            self.settings.queue_capacity,
        );

        let outcome = forwarder
            .forward(&mut session, &mut segments, live, &abort, registry)
            .await;
        segments.close().await;

        let status = match outcome {
            ForwardOutcome::Completed { buffer, early_end } => {
                match self.persist(&mut session, &buffer).await {
                    Ok(locator) => PipelineStatus::Persisted { locator, early_end },
                    Err(e) => PipelineStatus::PersistFailed(e.to_string()),
                }
            }
            ForwardOutcome::ProducerFailed(e) => {
                tracing::error!(
                    request_id = %session.request_id(),
                    error = %e,
                    "Generation failed before any audio"
                );
                PipelineStatus::ProducerFailed(e)
            }
            ForwardOutcome::Aborted { buffer, reason } => {
                tracing::warn!(
                    request_id = %session.request_id(),
                    reason = %reason,
                    segments = buffer.chunk_count(),
                    policy = ?self.settings.abort_policy,
                    "Generation aborted"
                );
                let locator = match self.settings.abort_policy {
                    AbortPolicy::PersistPartial if !buffer.is_empty() => {
                        self.persist(&mut session, &buffer).await.ok()
                    }
                    _ => None,
                };
                PipelineStatus::Aborted { reason, locator }
            }
        };

        advance(&mut session, SessionState::Closed, registry);

        PipelineReport {
            snapshot: session.snapshot(),
            status,
        }
    }

    async fn persist(
        &self,
        session: &mut StreamSession,
        buffer: &ChunkBuffer,
    ) -> Result<String, PersistenceError> {
        let registry = self.registry.as_ref();
        let request_id = session.request_id().clone();
        advance(session, SessionState::Persisting, registry);

        match self.persistence.persist(&request_id, buffer).await {
            Ok(locator) => {
                session.set_locator(locator.clone());
                advance(session, SessionState::Persisted, registry);
                Ok(locator)
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Persisting audio failed");
                session.set_error(e.to_string());
                advance(session, SessionState::PersistFailed, registry);
                Err(e)
            }
        }
    }
}
