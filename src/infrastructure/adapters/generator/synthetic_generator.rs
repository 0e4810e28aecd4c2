//! Synthetic Music Generator - 本地合成的生成器
//!
//! 不依赖外部模型：按种子在五声音阶上选音，合成正弦旋律。
//! 同样的种子和提示词产生同样的音频，用于开发和测试。

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::ops::Range;
use std::time::Duration;

use crate::application::ports::{GenerationError, MusicGeneratorPort, SegmentSink};
use crate::domain::generation::{GenerationRequest, SegmentPlan};

/// 五声音阶（相对 A3 的半音数）
const PENTATONIC: [i32; 10] = [0, 2, 4, 7, 9, 12, 14, 16, 19, 21];
const BASE_FREQUENCY: f32 = 220.0;
const AMPLITUDE: f32 = 0.3;
/// 每个音符持续的 token 数
const TOKENS_PER_NOTE: usize = 25;

/// Synthetic Generator 配置
#[derive(Debug, Clone)]
pub struct SyntheticGeneratorConfig {
    pub sample_rate: u32,
    pub frame_rate: u32,
    /// 每段模拟的推理耗时
    pub segment_delay: Duration,
}

impl Default for SyntheticGeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            frame_rate: 50,
            segment_delay: Duration::ZERO,
        }
    }
}

/// 本地合成生成器
pub struct SyntheticMusicGenerator {
    config: SyntheticGeneratorConfig,
}

impl SyntheticMusicGenerator {
    pub fn new(config: SyntheticGeneratorConfig) -> Self {
        tracing::info!(
            sample_rate = config.sample_rate,
            frame_rate = config.frame_rate,
            segment_delay_ms = config.segment_delay.as_millis() as u64,
            "SyntheticMusicGenerator initialized"
        );
        Self { config }
    }
}

/// 把提示词混入种子
fn mix_seed(seed: u64, prompt: &str) -> u64 {
    prompt
        .bytes()
        .fold(seed ^ 0x9E37_79B9_7F4A_7C15, |acc, b| {
            (acc.rotate_left(5) ^ b as u64).wrapping_mul(0x0100_0000_01B3)
        })
}

fn note_for(seed: u64, step: usize) -> i32 {
    let mut rng = StdRng::seed_from_u64(seed ^ (step as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    PENTATONIC[rng.gen_range(0..PENTATONIC.len())]
}

/// 合成 token 区间对应的采样
///
/// 按绝对采样序号计算相位，分段边界处波形连续
fn synthesize(seed: u64, tokens: Range<usize>, samples_per_token: usize, sample_rate: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity(tokens.len() * samples_per_token);
    for token in tokens {
        let note = note_for(seed, token / TOKENS_PER_NOTE);
        let frequency = BASE_FREQUENCY * 2f32.powf(note as f32 / 12.0);
        for i in 0..samples_per_token {
            let n = token * samples_per_token + i;
            let t = n as f32 / sample_rate as f32;
            out.push(AMPLITUDE * (2.0 * PI * frequency * t).sin());
        }
    }
    out
}

#[async_trait]
impl MusicGeneratorPort for SyntheticMusicGenerator {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn frame_rate(&self) -> u32 {
        self.config.frame_rate
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        plan: &SegmentPlan,
        sink: &mut SegmentSink,
    ) -> Result<(), GenerationError> {
        let seed = mix_seed(request.seed(), request.prompt().as_str());
        let samples_per_token = plan.samples_per_token();
        let sample_rate = plan.sample_rate();

        tracing::debug!(
            request_id = %request.request_id(),
            max_new_tokens = plan.max_new_tokens(),
            play_steps = plan.play_steps(),
            "Synthetic generation started"
        );

        let mut index = 0;
        while let Some(tokens) = plan.token_range(index) {
            if sink.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }

            let samples = tokio::task::spawn_blocking(move || {
                synthesize(seed, tokens, samples_per_token, sample_rate)
            })
            .await
            .map_err(|e| GenerationError::Interrupted(e.to_string()))?;

            if !self.config.segment_delay.is_zero() {
                tokio::select! {
                    _ = sink.cancellation().cancelled() => return Err(GenerationError::Cancelled),
                    _ = tokio::time::sleep(self.config.segment_delay) => {}
                }
            }

            sink.send(samples).await?;
            index += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SegmentItem;
    use crate::domain::generation::{Prompt, RequestId};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn generator() -> SyntheticMusicGenerator {
        SyntheticMusicGenerator::new(SyntheticGeneratorConfig {
            sample_rate: 800,
            frame_rate: 50,
            segment_delay: Duration::ZERO,
        })
    }

    fn request(prompt: &str, seed: u64) -> GenerationRequest {
        GenerationRequest::new(
            RequestId::new("syn-1").unwrap(),
            Prompt::new(prompt).unwrap(),
            12,
            4.0,
            seed,
        )
        .unwrap()
    }

    async fn run(generator: &SyntheticMusicGenerator, request: &GenerationRequest) -> Vec<Vec<f32>> {
        let plan = SegmentPlan::for_request(request, 800, 50).unwrap();
        let (tx, mut rx) = mpsc::channel::<SegmentItem>(8);
        let mut sink = SegmentSink::new(tx, CancellationToken::new());
        generator.generate(request, &plan, &mut sink).await.unwrap();
        drop(sink);

        let mut segments = Vec::new();
        while let Some(item) = rx.recv().await {
            segments.push(item.unwrap().samples);
        }
        segments
    }

    #[tokio::test]
    async fn test_segments_follow_plan() {
        let segments = run(&generator(), &request("ambient pads", 1)).await;

        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.len() == 3200));
        assert!(segments
            .iter()
            .flatten()
            .all(|v| v.abs() <= AMPLITUDE + f32::EPSILON));
    }

    #[tokio::test]
    async fn test_same_seed_is_deterministic() {
        let g = generator();
        let a = run(&g, &request("ambient pads", 42)).await;
        let b = run(&g, &request("ambient pads", 42)).await;
        let c = run(&g, &request("ambient pads", 43)).await;

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_stops_when_cancelled() {
        let g = generator();
        let req = request("ambient pads", 1);
        let plan = SegmentPlan::for_request(&req, 800, 50).unwrap();
        let (tx, _rx) = mpsc::channel::<SegmentItem>(1);
        let cancel = CancellationToken::new();
        let mut sink = SegmentSink::new(tx, cancel.clone());
        cancel.cancel();

        let result = g.generate(&req, &plan, &mut sink).await;
        assert_eq!(result, Err(GenerationError::Cancelled));
        assert_eq!(sink.delivered(), 0);
    }

    #[test]
    fn test_waveform_is_continuous_across_segments() {
        let whole = synthesize(7, 0..400, 16, 800);
        let mut split = synthesize(7, 0..200, 16, 800);
        split.extend(synthesize(7, 200..400, 16, 800));
        assert_eq!(whole, split);
    }
}
