//! Music Generator Port - 音乐生成模型抽象
//!
//! 生成模型被视为一个不透明的分段来源，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::generation::{AudioSegment, GenerationRequest, SegmentPlan};

/// 生成错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Producer interrupted: {0}")]
    Interrupted(String),

    #[error("Generation cancelled")]
    Cancelled,
}

/// 生产者与转发器之间交接的单项
pub type SegmentItem = Result<AudioSegment, GenerationError>;

/// 分段接收端（交给生成器使用）
///
/// 负责分配序号并通过有界队列交给下游。队列满时 `send` 挂起，
/// 从而把生成速度限制在下游消费速度以内。
pub struct SegmentSink {
    tx: mpsc::Sender<SegmentItem>,
    cancel: CancellationToken,
    next_index: usize,
}

impl SegmentSink {
    pub fn new(tx: mpsc::Sender<SegmentItem>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            next_index: 0,
        }
    }

    /// 交付一段音频，返回其序号
    pub async fn send(&mut self, samples: Vec<f32>) -> Result<usize, GenerationError> {
        let index = self.next_index;
        let segment = AudioSegment::new(index, samples);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
            sent = self.tx.send(Ok(segment)) => {
                sent.map_err(|_| GenerationError::Cancelled)?;
            }
        }

        self.next_index += 1;
        Ok(index)
    }

    /// 已交付的分段数
    pub fn delivered(&self) -> usize {
        self.next_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// 生成器内部长时间等待时可以 select 这个 token
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Music Generator Port
///
/// 外部生成模型的抽象接口
#[async_trait]
pub trait MusicGeneratorPort: Send + Sync {
    /// 输出采样率（Hz）
    fn sample_rate(&self) -> u32;

    /// 生成器 token 帧率（每秒 token 数）
    fn frame_rate(&self) -> u32;

    /// 执行生成
    ///
    /// 按 `plan` 的节奏把每一段音频交给 `sink`，生成顺序即交付顺序。
    /// 在开始生成前应用 `request.seed()`。
    async fn generate(
        &self,
        request: &GenerationRequest,
        plan: &SegmentPlan,
        sink: &mut SegmentSink,
    ) -> Result<(), GenerationError>;

    /// 检查生成服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
