//! Generation Context - Value Objects

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::GenerationDomainError;

/// 提示词最大字符数
pub const MAX_PROMPT_CHARS: usize = 200;
/// 提示词最大词数（按空白切分）
pub const MAX_PROMPT_TOKENS: usize = 200;
/// 目标时长下限（秒）
pub const MIN_DURATION_SECS: u32 = 10;
/// 目标时长上限（秒）
pub const MAX_DURATION_SECS: u32 = 45;

const MAX_REQUEST_ID_LEN: usize = 128;

/// 请求唯一标识
///
/// 同时作为存储对象 key 的前缀，因此只允许 `[A-Za-z0-9_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Result<Self, GenerationDomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(GenerationDomainError::InvalidRequestId(
                "request id cannot be empty".to_string(),
            ));
        }
        if id.len() > MAX_REQUEST_ID_LEN {
            return Err(GenerationDomainError::InvalidRequestId(format!(
                "request id longer than {} characters",
                MAX_REQUEST_ID_LEN
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(GenerationDomainError::InvalidRequestId(format!(
                "request id contains unsupported characters: {}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 文本提示词
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self, GenerationDomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(GenerationDomainError::InvalidPrompt(
                "prompt cannot be empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_PROMPT_CHARS {
            return Err(GenerationDomainError::InvalidPrompt(format!(
                "prompt must not exceed {} characters",
                MAX_PROMPT_CHARS
            )));
        }
        if text.split_whitespace().count() > MAX_PROMPT_TOKENS {
            return Err(GenerationDomainError::InvalidPrompt(format!(
                "prompt must not exceed {} tokens",
                MAX_PROMPT_TOKENS
            )));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 生成请求
///
/// 不变量:
/// - 创建后不可修改
/// - 目标时长在 [MIN_DURATION_SECS, MAX_DURATION_SECS] 之间
/// - 分段时长为正数
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    request_id: RequestId,
    prompt: Prompt,
    target_duration_secs: u32,
    segment_duration_secs: f32,
    seed: u64,
}

impl GenerationRequest {
    pub fn new(
        request_id: RequestId,
        prompt: Prompt,
        target_duration_secs: u32,
        segment_duration_secs: f32,
        seed: u64,
    ) -> Result<Self, GenerationDomainError> {
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&target_duration_secs) {
            return Err(GenerationDomainError::InvalidDuration(format!(
                "duration must be between {} and {} seconds, got {}",
                MIN_DURATION_SECS, MAX_DURATION_SECS, target_duration_secs
            )));
        }
        if !segment_duration_secs.is_finite() || segment_duration_secs <= 0.0 {
            return Err(GenerationDomainError::InvalidDuration(format!(
                "segment duration must be positive, got {}",
                segment_duration_secs
            )));
        }
        Ok(Self {
            request_id,
            prompt,
            target_duration_secs,
            segment_duration_secs,
            seed,
        })
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn target_duration_secs(&self) -> u32 {
        self.target_duration_secs
    }

    pub fn segment_duration_secs(&self) -> f32 {
        self.segment_duration_secs
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// 一段生成的音频（单声道浮点采样）
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// 生成顺序中的序号（从 0 开始）
    pub index: usize,
    pub samples: Vec<f32>,
}

impl AudioSegment {
    pub fn new(index: usize, samples: Vec<f32>) -> Self {
        Self { index, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 时长（秒）
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / sample_rate as f32
    }
}

/// 分段规划
///
/// 生成器按 token 步进，每个 token 对应 `sample_rate / frame_rate` 个采样。
/// 每累计 `play_steps` 个 token 就产出一段音频，最后一段可能不足。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    sample_rate: u32,
    frame_rate: u32,
    max_new_tokens: usize,
    play_steps: usize,
}

impl SegmentPlan {
    pub fn new(
        sample_rate: u32,
        frame_rate: u32,
        target_duration_secs: u32,
        segment_duration_secs: f32,
    ) -> Result<Self, GenerationDomainError> {
        if frame_rate == 0 || sample_rate < frame_rate {
            return Err(GenerationDomainError::InvalidPlan(format!(
                "sample rate {} must be >= frame rate {} > 0",
                sample_rate, frame_rate
            )));
        }
        if !segment_duration_secs.is_finite() || segment_duration_secs <= 0.0 {
            return Err(GenerationDomainError::InvalidPlan(format!(
                "segment duration must be positive, got {}",
                segment_duration_secs
            )));
        }

        let max_new_tokens = frame_rate as usize * target_duration_secs as usize;
        let play_steps = (frame_rate as f32 * segment_duration_secs).floor() as usize;

        if max_new_tokens == 0 {
            return Err(GenerationDomainError::InvalidPlan(
                "target duration yields zero tokens".to_string(),
            ));
        }
        if play_steps == 0 {
            return Err(GenerationDomainError::InvalidPlan(format!(
                "segment duration {}s is shorter than one frame",
                segment_duration_secs
            )));
        }

        Ok(Self {
            sample_rate,
            frame_rate,
            max_new_tokens,
            play_steps,
        })
    }

    /// 根据请求和生成器参数构建规划
    pub fn for_request(
        request: &GenerationRequest,
        sample_rate: u32,
        frame_rate: u32,
    ) -> Result<Self, GenerationDomainError> {
        Self::new(
            sample_rate,
            frame_rate,
            request.target_duration_secs(),
            request.segment_duration_secs(),
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn max_new_tokens(&self) -> usize {
        self.max_new_tokens
    }

    pub fn play_steps(&self) -> usize {
        self.play_steps
    }

    pub fn samples_per_token(&self) -> usize {
        (self.sample_rate / self.frame_rate) as usize
    }

    pub fn segment_count(&self) -> usize {
        self.max_new_tokens.div_ceil(self.play_steps)
    }

    /// 第 `index` 段覆盖的 token 区间
    pub fn token_range(&self, index: usize) -> Option<Range<usize>> {
        let start = index.checked_mul(self.play_steps)?;
        if start >= self.max_new_tokens {
            return None;
        }
        let end = (start + self.play_steps).min(self.max_new_tokens);
        Some(start..end)
    }

    /// 第 `index` 段的采样数
    pub fn segment_samples(&self, index: usize) -> Option<usize> {
        self.token_range(index)
            .map(|range| range.len() * self.samples_per_token())
    }

    pub fn total_samples(&self) -> usize {
        self.max_new_tokens * self.samples_per_token()
    }
}
