//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod blob_storage;
mod music_generator;
mod session_registry;

pub use blob_storage::{validate_object_key, BlobStoragePort, StorageError};
pub use music_generator::{
    GenerationError, MusicGeneratorPort, SegmentItem, SegmentSink,
};
pub use session_registry::SessionRegistryPort;
