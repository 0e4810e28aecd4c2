//! Container Framer - 流式 WAV 封装
//!
//! 每段浮点采样编码为 16-bit 小端 PCM，仅第一段前面加 44 字节 WAV 头。
//! 流开始时总长度未知，头中的长度字段写入哨兵值。

use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::generation::AudioSegment;

/// WAV 头长度（字节）
pub const WAV_HEADER_LEN: usize = 44;
/// 每个采样的位深
pub const BITS_PER_SAMPLE: u16 = 16;
/// 声道数（单声道）
pub const CHANNELS: u16 = 1;
/// 流式头中 data 长度的哨兵值
pub const DATA_SIZE_SENTINEL: u32 = 2_000_000_000;
/// 浮点采样 → i16 的满幅缩放系数
pub const PCM_FULL_SCALE: f32 = 32767.0;
/// 输出内容类型
pub const WAV_CONTENT_TYPE: &str = "audio/x-wav";

/// RIFF 长度字段在头中的偏移
pub const RIFF_SIZE_OFFSET: u64 = 4;
/// data 长度字段在头中的偏移
pub const DATA_SIZE_OFFSET: u64 = 40;

/// RIFF 长度 = data 长度 + 36（头中 RIFF 长度字段之后的部分）
pub fn riff_size_for(data_size: u32) -> u32 {
    data_size.saturating_add(WAV_HEADER_LEN as u32 - 8)
}

/// PCM WAV 文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// 流式输出使用的头（长度字段为哨兵值）
    pub fn streaming(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            channels: CHANNELS,
            data_size: DATA_SIZE_SENTINEL,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let mut out = [0u8; WAV_HEADER_LEN];
        let mut buf = &mut out[..];

        buf.put_slice(b"RIFF");
        buf.put_u32_le(riff_size_for(self.data_size));
        buf.put_slice(b"WAVE");

        buf.put_slice(b"fmt ");
        buf.put_u32_le(16); // fmt chunk size
        buf.put_u16_le(1); // PCM
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.byte_rate());
        buf.put_u16_le(self.block_align());
        buf.put_u16_le(self.bits_per_sample);

        buf.put_slice(b"data");
        buf.put_u32_le(self.data_size);

        out
    }
}

/// 把浮点采样编码为 16-bit 小端 PCM 追加到 `out`
///
/// 采样先截断到 [-1.0, 1.0]，NaN 编码为 0。
pub fn encode_pcm16(samples: &[f32], scale: f32, out: &mut BytesMut) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * scale) as i16;
        out.put_i16_le(value);
    }
}

/// WAV 分帧器
///
/// 无状态；是否为第一段由调用方跟踪
#[derive(Debug, Clone, Copy)]
pub struct WavFramer {
    sample_rate: u32,
    scale: f32,
}

impl WavFramer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_scale(sample_rate, PCM_FULL_SCALE)
    }

    pub fn with_scale(sample_rate: u32, scale: f32) -> Self {
        Self { sample_rate, scale }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn header(&self) -> WavHeader {
        WavHeader::streaming(self.sample_rate)
    }

    /// 把一段音频封装为可直接传输的字节块
    pub fn frame(&self, segment: &AudioSegment, is_first: bool) -> Bytes {
        let header_len = if is_first { WAV_HEADER_LEN } else { 0 };
        let mut out = BytesMut::with_capacity(header_len + segment.len() * 2);

        if is_first {
            out.put_slice(&self.header().to_bytes());
        }
        encode_pcm16(&segment.samples, self.scale, &mut out);

        out.freeze()
    }
}
