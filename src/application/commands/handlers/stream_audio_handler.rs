//! Stream Audio Handler - 校验请求并在后台启动管线

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::commands::stream_commands::{StreamAudioCommand, StreamAudioStarted};
use crate::application::error::ApplicationError;
use crate::application::pipeline::{PipelineStatus, StreamPipeline, WAV_CONTENT_TYPE};
use crate::domain::generation::{GenerationRequest, Prompt, RequestId};

/// StreamAudio Handler - 启动一次流式生成
pub struct StreamAudioHandler {
    pipeline: Arc<StreamPipeline>,
    segment_duration_secs: f32,
    /// 直播通道可缓冲的块数
    live_buffer_chunks: usize,
    /// 请求未指定种子时使用，相同提示词得到相同音频
    default_seed: u64,
    /// 服务关闭时取消所有进行中的生成
    shutdown: CancellationToken,
    /// 管线任务，关闭时等待其完成持久化
    tasks: TaskTracker,
}

impl StreamAudioHandler {
    pub fn new(
        pipeline: Arc<StreamPipeline>,
        segment_duration_secs: f32,
        live_buffer_chunks: usize,
        default_seed: u64,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            pipeline,
            segment_duration_secs,
            live_buffer_chunks: live_buffer_chunks.max(1),
            default_seed,
            shutdown,
            tasks,
        }
    }

    /// 进行中的管线任务
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn handle(&self, cmd: StreamAudioCommand) -> Result<StreamAudioStarted, ApplicationError> {
        let request_id = RequestId::new(cmd.request_id)?;
        let prompt = Prompt::new(cmd.prompt)?;
        let seed = cmd.seed.unwrap_or(self.default_seed);
        let request = GenerationRequest::new(
            request_id.clone(),
            prompt,
            cmd.duration_secs,
            self.segment_duration_secs,
            seed,
        )?;
        let plan = self.pipeline.plan(&request)?;

        let (tx, rx) = mpsc::channel(self.live_buffer_chunks);
        let abort = self.shutdown.child_token();

        let pipeline = self.pipeline.clone();
        let task_abort = abort.clone();
        let report = self.tasks.spawn(async move {
            let report = pipeline.run(request, plan, Some(tx), task_abort).await;
            match &report.status {
                PipelineStatus::Persisted { locator, .. } => tracing::info!(
                    request_id = %report.snapshot.request_id,
                    locator = %locator,
                    "Request finished"
                ),
                status => tracing::warn!(
                    request_id = %report.snapshot.request_id,
                    status = ?status,
                    "Request finished without persisted audio"
                ),
            }
            report
        });

        Ok(StreamAudioStarted {
            request_id,
            content_type: WAV_CONTENT_TYPE,
            sample_rate: self.pipeline.sample_rate(),
            live: rx,
            abort,
            report,
        })
    }
}
