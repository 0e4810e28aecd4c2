//! Event Publisher Implementation
//!
//! 生成状态的 WebSocket 事件推送（与音频流分离的状态通道）

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::generation::{SessionSnapshot, SessionState};

/// WebSocket 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GenerationEvent {
    /// 开始流式输出
    GenerationStarted { request_id: String },
    /// 直播连接失效，继续生成并保存
    GenerationDegraded {
        request_id: String,
        segments_delivered: usize,
    },
    /// 生成器在交付任何音频前失败
    GenerationFailed { request_id: String, error: String },
    /// 请求被取消或超时
    GenerationAborted {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// 音频已保存
    AudioPersisted {
        request_id: String,
        locator: String,
        bytes: u64,
    },
    /// 保存失败
    PersistFailed { request_id: String, error: String },
    /// 会话结束
    SessionClosed { request_id: String },
}

impl GenerationEvent {
    pub fn request_id(&self) -> &str {
        match self {
            GenerationEvent::GenerationStarted { request_id }
            | GenerationEvent::GenerationDegraded { request_id, .. }
            | GenerationEvent::GenerationFailed { request_id, .. }
            | GenerationEvent::GenerationAborted { request_id, .. }
            | GenerationEvent::AudioPersisted { request_id, .. }
            | GenerationEvent::PersistFailed { request_id, .. }
            | GenerationEvent::SessionClosed { request_id } => request_id,
        }
    }

    /// 由会话快照推导事件；中间状态不推送
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Option<Self> {
        let request_id = snapshot.request_id.clone();
        let error = || snapshot.error.clone().unwrap_or_default();
        let event = match snapshot.state {
            SessionState::Streaming => GenerationEvent::GenerationStarted { request_id },
            SessionState::Degraded => GenerationEvent::GenerationDegraded {
                request_id,
                segments_delivered: snapshot.segments_delivered,
            },
            SessionState::Failed => GenerationEvent::GenerationFailed {
                request_id,
                error: error(),
            },
            SessionState::Aborted => GenerationEvent::GenerationAborted {
                request_id,
                error: snapshot.error.clone(),
            },
            SessionState::Persisted => GenerationEvent::AudioPersisted {
                request_id,
                locator: snapshot.locator.clone().unwrap_or_default(),
                bytes: snapshot.bytes_accumulated,
            },
            SessionState::PersistFailed => GenerationEvent::PersistFailed {
                request_id,
                error: error(),
            },
            SessionState::Closed => GenerationEvent::SessionClosed { request_id },
            SessionState::Created | SessionState::Completed | SessionState::Persisting => {
                return None
            }
        };
        Some(event)
    }
}

/// 事件发布器
pub struct EventPublisher {
    global_channel: broadcast::Sender<GenerationEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(256);
        Self {
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅所有生成事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<GenerationEvent> {
        self.global_channel.subscribe()
    }

    pub fn publish(&self, event: GenerationEvent) {
        if let Err(e) = self.global_channel.send(event) {
            tracing::debug!(
                request_id = %e.0.request_id(),
                "Failed to publish event (no receivers)"
            );
        }
    }

    /// 按快照发布事件
    pub fn publish_snapshot(&self, snapshot: &SessionSnapshot) {
        if let Some(event) = GenerationEvent::from_snapshot(snapshot) {
            self.publish(event);
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generation::{RequestId, StreamSession};

    #[tokio::test]
    async fn test_snapshot_events_reach_subscribers() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe_global();

        let mut session = StreamSession::new(RequestId::new("ev-1").unwrap());
        publisher.publish_snapshot(&session.snapshot());
        session.transition(SessionState::Streaming).unwrap();
        publisher.publish_snapshot(&session.snapshot());

        // Created 不推送
        assert_eq!(
            rx.recv().await.unwrap(),
            GenerationEvent::GenerationStarted {
                request_id: "ev-1".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let event = GenerationEvent::AudioPersisted {
            request_id: "ev-1".to_string(),
            locator: "file:///tmp/ev-1/output.wav".to_string(),
            bytes: 44,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "AudioPersisted");
        assert_eq!(json["data"]["request_id"], "ev-1");
        assert_eq!(json["data"]["bytes"], 44);
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let publisher = EventPublisher::new();
        publisher.publish(GenerationEvent::SessionClosed {
            request_id: "ev-1".to_string(),
        });
    }
}
