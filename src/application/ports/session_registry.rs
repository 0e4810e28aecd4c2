//! Session Registry Port - 流式会话状态登记
//!
//! 持久化结果不会出现在音频字节流中，而是通过这里对外暴露

use crate::domain::generation::SessionSnapshot;

/// Session Registry Port
///
/// 管线在每次状态转换后调用 `record`，HTTP 层通过 `get` 查询
pub trait SessionRegistryPort: Send + Sync {
    /// 登记最新快照（同一 request_id 覆盖）
    fn record(&self, snapshot: &SessionSnapshot);

    /// 查询快照
    fn get(&self, request_id: &str) -> Option<SessionSnapshot>;

    /// 尚未关闭的会话数
    fn active_count(&self) -> usize;
}
