//! Generation Context - Errors

use thiserror::Error;

use super::SessionState;

#[derive(Debug, Error, PartialEq)]
pub enum GenerationDomainError {
    #[error("无效的请求 ID: {0}")]
    InvalidRequestId(String),

    #[error("无效的提示词: {0}")]
    InvalidPrompt(String),

    #[error("无效的时长: {0}")]
    InvalidDuration(String),

    #[error("无效的分段规划: {0}")]
    InvalidPlan(String),

    #[error("非法的会话状态转换: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
