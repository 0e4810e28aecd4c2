//! Memory Layer - In-Memory State Management
//!
//! 实现 SessionRegistry，保存生成会话的最新快照

mod session_registry;

pub use session_registry::InMemorySessionRegistry;
