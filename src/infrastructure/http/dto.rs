//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::domain::generation::{SessionSnapshot, SessionState};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Generation DTOs
// ============================================================================

/// `GET /api/generate_audio` 查询参数
#[derive(Debug, Deserialize)]
pub struct GenerateAudioParams {
    /// 请求 ID，同时决定存储位置 `{uuid}/output.wav`
    pub uuid: String,
    pub prompt: String,
    /// 目标时长（秒）
    pub duration: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerationStatusResponse {
    pub request_id: String,
    pub state: SessionState,
    pub segments_delivered: usize,
    pub bytes_accumulated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionSnapshot> for GenerationStatusResponse {
    fn from(s: SessionSnapshot) -> Self {
        Self {
            request_id: s.request_id,
            state: s.state,
            segments_delivered: s.segments_delivered,
            bytes_accumulated: s.bytes_accumulated,
            locator: s.locator,
            error: s.error,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// WebSocket DTOs
// ============================================================================

/// `/ws/events` 查询参数；指定 request_id 时只推送该请求的事件
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub request_id: Option<String>,
}
