//! In-Memory Session Registry Implementation

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::SessionRegistryPort;
use crate::domain::generation::{SessionSnapshot, SessionState};
use crate::infrastructure::events::EventPublisher;

/// 内存会话登记
///
/// 同一请求 ID 只保留最新快照；关闭超过保留期的会话在下次关闭时清理
pub struct InMemorySessionRegistry {
    /// request_id -> 最新快照
    sessions: DashMap<String, SessionSnapshot>,
    publisher: Arc<EventPublisher>,
    retention: Duration,
}

impl InMemorySessionRegistry {
    pub fn new(publisher: Arc<EventPublisher>, retention: std::time::Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            publisher,
            retention: Duration::from_std(retention).unwrap_or_else(|_| Duration::weeks(52 * 100)),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 清理已关闭且过期的会话，返回清理数量
    pub fn prune_closed(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| !(s.state == SessionState::Closed && s.updated_at < cutoff));
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned closed sessions");
        }
        pruned
    }
}

impl SessionRegistryPort for InMemorySessionRegistry {
    fn record(&self, snapshot: &SessionSnapshot) {
        self.sessions
            .insert(snapshot.request_id.clone(), snapshot.clone());
        self.publisher.publish_snapshot(snapshot);

        if snapshot.state == SessionState::Closed {
            self.prune_closed();
        }
    }

    fn get(&self, request_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(request_id).map(|s| s.clone())
    }

    fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.state != SessionState::Closed)
            .count()
    }
}
