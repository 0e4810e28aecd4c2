//! Generation Context - 音乐生成限界上下文
//!
//! 职责:
//! - 生成请求（提示词、时长、种子）
//! - 分段规划（生成器 token 步长 → 音频分段）
//! - 流式会话状态机

mod errors;
mod session;
mod value_objects;

pub use errors::GenerationDomainError;
pub use session::{SessionSnapshot, SessionState, StreamSession};
pub use value_objects::{
    AudioSegment, GenerationRequest, Prompt, RequestId, SegmentPlan, MAX_DURATION_SECS,
    MAX_PROMPT_CHARS, MAX_PROMPT_TOKENS, MIN_DURATION_SECS,
};
