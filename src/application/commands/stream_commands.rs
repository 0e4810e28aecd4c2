//! Stream Commands - 流式生成命令

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::pipeline::{LiveReceiver, PipelineReport};
use crate::domain::generation::RequestId;

/// 流式生成音频命令
#[derive(Debug, Clone)]
pub struct StreamAudioCommand {
    pub request_id: String,
    pub prompt: String,
    pub duration_secs: u32,
    /// 为空时使用配置的默认种子
    pub seed: Option<u64>,
}

/// 已启动的生成
///
/// `live` 被丢弃等同于客户端断开；生成和持久化继续在 `report` 任务中完成
pub struct StreamAudioStarted {
    pub request_id: RequestId,
    pub content_type: &'static str,
    pub sample_rate: u32,
    pub live: LiveReceiver,
    pub abort: CancellationToken,
    pub report: JoinHandle<PipelineReport>,
}
