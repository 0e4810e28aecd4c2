//! Status Queries - 生成状态查询

/// 按请求 ID 查询会话状态
#[derive(Debug, Clone)]
pub struct GetGenerationStatus {
    pub request_id: String,
}
