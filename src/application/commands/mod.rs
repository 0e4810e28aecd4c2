//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：启动生成

mod stream_commands;

pub mod handlers;

pub use stream_commands::*;
