//! Domain Layer - 领域层
//!
//! 限界上下文:
//! - Generation Context: 音乐生成请求、分段规划与流式会话

pub mod generation;
