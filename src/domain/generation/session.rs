//! Generation Context - Stream Session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GenerationDomainError, RequestId};

/// 流式会话状态
///
/// ```text
/// Created → Streaming → {Completed, Degraded, Failed, Aborted}
///         → Persisting → {Persisted, PersistFailed} → Closed
/// ```
///
/// `Failed`（零段产出）和丢弃策略下的 `Aborted` 直接进入 `Closed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Streaming,
    /// 生成结束，直播通道全程可用
    Completed,
    /// 直播通道中途失效，仅继续累积
    Degraded,
    /// 生成器在产出任何分段前失败
    Failed,
    /// 请求被取消或超时
    Aborted,
    Persisting,
    Persisted,
    PersistFailed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Degraded => "degraded",
            SessionState::Failed => "failed",
            SessionState::Aborted => "aborted",
            SessionState::Persisting => "persisting",
            SessionState::Persisted => "persisted",
            SessionState::PersistFailed => "persist_failed",
            SessionState::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Streaming)
                | (Streaming, Completed)
                | (Streaming, Degraded)
                | (Streaming, Failed)
                | (Streaming, Aborted)
                | (Degraded, Aborted)
                | (Completed, Persisting)
                | (Degraded, Persisting)
                | (Aborted, Persisting)
                | (Aborted, Closed)
                | (Failed, Closed)
                | (Persisting, Persisted)
                | (Persisting, PersistFailed)
                | (Persisted, Closed)
                | (PersistFailed, Closed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 流式会话
///
/// 每个请求一个，生命周期从请求开始到直播与持久化都结束为止。
pub struct StreamSession {
    request_id: RequestId,
    state: SessionState,
    segments_delivered: usize,
    bytes_accumulated: u64,
    locator: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StreamSession {
    pub fn new(request_id: RequestId) -> Self {
        let now = Utc::now();
        Self {
            request_id,
            state: SessionState::Created,
            segments_delivered: 0,
            bytes_accumulated: 0,
            locator: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), GenerationDomainError> {
        if !self.state.can_transition_to(next) {
            return Err(GenerationDomainError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            request_id = %self.request_id,
            old_state = %self.state,
            new_state = %next,
            "Session state changed"
        );
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 记录一段已被转发器接收并累积的数据
    pub fn record_chunk(&mut self, bytes: usize) {
        self.segments_delivered += 1;
        self.bytes_accumulated += bytes as u64;
        self.updated_at = Utc::now();
    }

    pub fn set_locator(&mut self, locator: impl Into<String>) {
        self.locator = Some(locator.into());
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn segments_delivered(&self) -> usize {
        self.segments_delivered
    }

    pub fn bytes_accumulated(&self) -> u64 {
        self.bytes_accumulated
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            request_id: self.request_id.as_str().to_string(),
            state: self.state,
            segments_delivered: self.segments_delivered,
            bytes_accumulated: self.bytes_accumulated,
            locator: self.locator.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 会话快照（对外查询和事件推送使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub request_id: String,
    pub state: SessionState,
    pub segments_delivered: usize,
    pub bytes_accumulated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
