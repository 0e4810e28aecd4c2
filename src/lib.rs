//! TuneStream - 流式音乐生成服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Generation Context: 请求、分段规划与会话状态机
//!
//! 应用层 (application/):
//! - Ports: 端口定义（MusicGenerator, BlobStorage, SessionRegistry）
//! - Pipeline: 分段生产、WAV 分帧、双路转发与持久化
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: 流式音频接口 + WebSocket 事件
//! - Adapters: 生成模型客户端、对象存储
//! - Memory: 会话登记内存实现
//! - Events: 生命周期事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
