//! Status Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::SessionRegistryPort;
use crate::application::queries::status_queries::GetGenerationStatus;
use crate::domain::generation::SessionSnapshot;

/// GetGenerationStatus Handler - 获取会话最新快照
pub struct GetGenerationStatusHandler {
    registry: Arc<dyn SessionRegistryPort>,
}

impl GetGenerationStatusHandler {
    pub fn new(registry: Arc<dyn SessionRegistryPort>) -> Self {
        Self { registry }
    }

    pub fn handle(&self, query: GetGenerationStatus) -> Result<SessionSnapshot, ApplicationError> {
        self.registry
            .get(&query.request_id)
            .ok_or_else(|| ApplicationError::not_found("Generation", query.request_id))
    }

    /// 尚未关闭的会话数
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }
}
