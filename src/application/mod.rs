//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（MusicGenerator、BlobStorage、SessionRegistry）
//! - pipeline: 分段生产、WAV 分帧、双路转发、持久化
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod queries;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use commands::{handlers::StreamAudioHandler, StreamAudioCommand, StreamAudioStarted};

pub use error::ApplicationError;

pub use pipeline::{
    AbortPolicy, AbortReason, HeaderPolicy, PersistenceSink, PipelineReport, PipelineSettings,
    PipelineStatus, StreamPipeline,
};

pub use ports::{
    BlobStoragePort, GenerationError, MusicGeneratorPort, SegmentSink, SessionRegistryPort,
    StorageError,
};

pub use queries::{handlers::GetGenerationStatusHandler, GetGenerationStatus};
