//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::{
    GetGenerationStatusHandler, MusicGeneratorPort, SessionRegistryPort, StreamAudioHandler,
    StreamPipeline,
};
use crate::infrastructure::events::EventPublisher;

/// 每个请求的流式参数
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub segment_duration_secs: f32,
    pub live_buffer_chunks: usize,
    /// 请求未带种子时使用
    pub default_seed: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            segment_duration_secs: 4.0,
            live_buffer_chunks: 2,
            default_seed: 0,
        }
    }
}

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub generator: Arc<dyn MusicGeneratorPort>,
    pub registry: Arc<dyn SessionRegistryPort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Command Handlers ==========
    pub stream_audio_handler: StreamAudioHandler,

    // ========== Query Handlers ==========
    pub get_status_handler: GetGenerationStatusHandler,
}

impl AppState {
    /// 创建应用状态
    ///
    /// `shutdown` 被取消时，所有进行中的生成随之中止；管线任务登记在 `tasks` 中
    pub fn new(
        generator: Arc<dyn MusicGeneratorPort>,
        pipeline: Arc<StreamPipeline>,
        registry: Arc<dyn SessionRegistryPort>,
        event_publisher: Arc<EventPublisher>,
        options: StreamOptions,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            // Ports
            generator,
            registry: registry.clone(),
            event_publisher,

            // Command handlers
            stream_audio_handler: StreamAudioHandler::new(
                pipeline,
                options.segment_duration_secs,
                options.live_buffer_chunks,
                options.default_seed,
                shutdown,
                tasks,
            ),

            // Query handlers
            get_status_handler: GetGenerationStatusHandler::new(registry),
        }
    }
}
