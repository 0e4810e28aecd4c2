//! Dual-Sink Forwarder - 直播 + 累积双路转发
//!
//! 每个分帧后的字节块都同时交给直播通道和累积缓冲，两路共享同一块 `Bytes`。
//! 直播通道失效后降级为只累积，继续消费生产者直到结束。

use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::framer::WavFramer;
use super::producer::SegmentStream;
use super::{advance, AbortReason};
use crate::application::ports::{GenerationError, SessionRegistryPort};
use crate::domain::generation::{SessionState, StreamSession};

/// 直播通道传输的单项；`Err` 表示音频源异常结束
pub type LiveItem = Result<Bytes, io::Error>;
pub type LiveSender = mpsc::Sender<LiveItem>;
pub type LiveReceiver = mpsc::Receiver<LiveItem>;

/// 直播通道失败（仅在转发器内部处理，不向生产者暴露）
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("live receiver disconnected")]
    Disconnected,

    #[error("live send timed out after {0:?}")]
    Timeout(Duration),
}

/// 累积缓冲
///
/// 只保存对分帧结果的引用，持久化时按顺序写出
#[derive(Debug, Default, Clone)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
    len: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// 累计字节数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// 拼接为连续字节
    pub fn concat(&self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks[0].clone();
        }
        let mut out = BytesMut::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }
}

/// 转发结果
#[derive(Debug)]
pub enum ForwardOutcome {
    /// 生成结束；`early_end` 不为空表示已产出部分分段后生成器失败
    Completed {
        buffer: ChunkBuffer,
        early_end: Option<GenerationError>,
    },
    /// 生成器在交付任何分段前失败
    ProducerFailed(GenerationError),
    /// 请求被取消或超时
    Aborted {
        buffer: ChunkBuffer,
        reason: AbortReason,
    },
}

/// 转发器配置
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// 单块直播写入的最长等待
    pub live_send_timeout: Duration,
    /// 整个请求的期限，`None` 表示不限
    pub request_timeout: Option<Duration>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            live_send_timeout: Duration::from_secs(30),
            request_timeout: None,
        }
    }
}

/// 双路转发器
pub struct DualSinkForwarder {
    framer: WavFramer,
    config: ForwarderConfig,
}

impl DualSinkForwarder {
    pub fn new(framer: WavFramer, config: ForwarderConfig) -> Self {
        Self { framer, config }
    }

    /// 消费分段流直到结束、失败或中止
    ///
    /// 会话从 `Created` 推进到 `Completed` / `Degraded` / `Failed` / `Aborted` 之一
    pub async fn forward(
        &self,
        session: &mut StreamSession,
        segments: &mut SegmentStream,
        live: Option<LiveSender>,
        abort: &CancellationToken,
        registry: &dyn SessionRegistryPort,
    ) -> ForwardOutcome {
        let request_timeout = self.config.request_timeout;
        let stop = async move {
            match request_timeout {
                Some(limit) => tokio::select! {
                    _ = abort.cancelled() => AbortReason::Cancelled,
                    _ = tokio::time::sleep(limit) => AbortReason::Deadline,
                },
                None => {
                    abort.cancelled().await;
                    AbortReason::Cancelled
                }
            }
        };
        tokio::pin!(stop);

        let mut live = live;
        let mut buffer = ChunkBuffer::new();
        let mut is_first = true;
        let mut degraded = false;

        advance(session, SessionState::Streaming, registry);

        // Ok(None): 正常结束；Ok(Some(e)): 生成器失败；Err: 中止
        let end: Result<Option<GenerationError>, AbortReason> = loop {
            let item = tokio::select! {
                biased;
                reason = &mut stop => break Err(reason),
                item = segments.next() => item,
            };

            let segment = match item {
                None => break Ok(None),
                Some(Err(e)) => break Ok(Some(e)),
                Some(Ok(segment)) => segment,
            };

            let chunk = self.framer.frame(&segment, is_first);
            is_first = false;
            buffer.push(chunk.clone());
            session.record_chunk(chunk.len());

            tracing::debug!(
                request_id = %session.request_id(),
                segment_index = segment.index,
                samples = segment.len(),
                duration_secs = segment.duration_secs(self.framer.sample_rate()),
                chunk_bytes = chunk.len(),
                "Segment framed"
            );

            if let Some(tx) = live.as_ref() {
                let sent = tokio::select! {
                    biased;
                    reason = &mut stop => break Err(reason),
                    sent = self.send_live(tx, chunk) => sent,
                };

                if let Err(failure) = sent {
                    tracing::warn!(
                        request_id = %session.request_id(),
                        segment_index = segment.index,
                        error = %failure,
                        "Live transport failed, continuing accumulate-only"
                    );
                    live = None;
                    degraded = true;
                    advance(session, SessionState::Degraded, registry);
                }
            }
        };

        match end {
            Ok(None) => {
                if !degraded {
                    advance(session, SessionState::Completed, registry);
                }
                tracing::info!(
                    request_id = %session.request_id(),
                    segments = buffer.chunk_count(),
                    bytes = buffer.len(),
                    degraded,
                    "Generation stream completed"
                );
                ForwardOutcome::Completed {
                    buffer,
                    early_end: None,
                }
            }
            Ok(Some(e)) if buffer.chunk_count() == 0 => {
                self.signal_abnormal_end(live, format!("generation failed: {}", e))
                    .await;
                session.set_error(e.to_string());
                advance(session, SessionState::Failed, registry);
                ForwardOutcome::ProducerFailed(e)
            }
            Ok(Some(e)) => {
                self.signal_abnormal_end(live, format!("generation ended early: {}", e))
                    .await;
                session.set_error(format!("generation ended early: {}", e));
                if !degraded {
                    advance(session, SessionState::Completed, registry);
                }
                tracing::warn!(
                    request_id = %session.request_id(),
                    segments = buffer.chunk_count(),
                    error = %e,
                    "Generation ended early, keeping partial audio"
                );
                ForwardOutcome::Completed {
                    buffer,
                    early_end: Some(e),
                }
            }
            Err(reason) => {
                segments.cancel();
                self.signal_abnormal_end(live, format!("generation aborted: {}", reason))
                    .await;
                session.set_error(format!("generation aborted: {}", reason));
                advance(session, SessionState::Aborted, registry);
                ForwardOutcome::Aborted { buffer, reason }
            }
        }
    }

    async fn send_live(&self, tx: &LiveSender, chunk: Bytes) -> Result<(), TransportFailure> {
        match tokio::time::timeout(self.config.live_send_timeout, tx.send(Ok(chunk))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportFailure::Disconnected),
            Err(_) => Err(TransportFailure::Timeout(self.config.live_send_timeout)),
        }
    }

    /// 让直播连接以错误结束，而不是看起来像正常结束
    async fn signal_abnormal_end(&self, live: Option<LiveSender>, message: String) {
        if let Some(tx) = live {
            let item = Err(io::Error::new(io::ErrorKind::Other, message));
            let _ = tokio::time::timeout(self.config.live_send_timeout, tx.send(item)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::framer::{WavHeader, WAV_HEADER_LEN};
    use crate::application::pipeline::producer::SegmentProducer;
    use crate::application::test_support::{
        request, RecordingRegistry, Script, ScriptedGenerator, TEST_SAMPLE_RATE,
    };
    use crate::domain::generation::{RequestId, SegmentPlan};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const SEGMENT: usize = 3200; // 4s @ 800Hz

    fn plan() -> SegmentPlan {
        SegmentPlan::new(TEST_SAMPLE_RATE, 50, 12, 4.0).unwrap()
    }

    fn forwarder(config: ForwarderConfig) -> DualSinkForwarder {
        DualSinkForwarder::new(WavFramer::new(TEST_SAMPLE_RATE), config)
    }

    fn session() -> StreamSession {
        StreamSession::new(RequestId::new("req-1").unwrap())
    }

    fn spawn(script: Vec<Script>) -> (Arc<ScriptedGenerator>, SegmentStream) {
        let generator = Arc::new(ScriptedGenerator::new(script));
        let stream = SegmentProducer::spawn(generator.clone(), request(12), plan(), 2);
        (generator, stream)
    }

    /// 读取直播通道直到关闭
    fn collect(mut rx: LiveReceiver) -> tokio::task::JoinHandle<(Vec<Bytes>, Option<io::Error>)> {
        tokio::spawn(async move {
            let mut chunks = Vec::new();
            while let Some(item) = rx.recv().await {
                match item {
                    Ok(chunk) => chunks.push(chunk),
                    Err(e) => return (chunks, Some(e)),
                }
            }
            (chunks, None)
        })
    }

    fn concat(chunks: &[Bytes]) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }

    #[tokio::test]
    async fn test_live_and_accumulated_bytes_match() {
        let (_, mut stream) = spawn(vec![Script::FollowPlan]);
        let (tx, rx) = mpsc::channel(2);
        let reader = collect(rx);
        let registry = RecordingRegistry::new();
        let mut session = session();

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, Some(tx), &CancellationToken::new(), &registry)
            .await;

        let (live_chunks, live_err) = reader.await.unwrap();
        assert!(live_err.is_none());

        let ForwardOutcome::Completed { buffer, early_end } = outcome else {
            panic!("expected completion");
        };
        assert!(early_end.is_none());
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.len(), WAV_HEADER_LEN + 3 * SEGMENT * 2);
        assert_eq!(concat(&live_chunks), buffer.concat().to_vec());

        // 第一块以流式头开始
        assert_eq!(
            &live_chunks[0][..WAV_HEADER_LEN],
            &WavHeader::streaming(TEST_SAMPLE_RATE).to_bytes()
        );
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(
            registry.states(),
            vec![SessionState::Streaming, SessionState::Completed]
        );
    }

    #[tokio::test]
    async fn test_segments_keep_generation_order() {
        let (_, mut stream) = spawn(vec![Script::FollowPlan]);
        let registry = RecordingRegistry::new();
        let mut session = session();

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, None, &CancellationToken::new(), &registry)
            .await;

        let ForwardOutcome::Completed { buffer, .. } = outcome else {
            panic!("expected completion");
        };
        let bytes = buffer.concat();
        for index in 0..3 {
            let offset = WAV_HEADER_LEN + index * SEGMENT * 2;
            let sample = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            let expected = (ScriptedGenerator::sample_value(index) * 32767.0) as i16;
            assert_eq!(sample, expected, "segment {} out of order", index);
        }
    }

    #[tokio::test]
    async fn test_disconnect_degrades_to_accumulate_only() {
        let gate = Arc::new(Notify::new());
        let (_, mut stream) = spawn(vec![
            Script::Segment(SEGMENT),
            Script::WaitFor(gate.clone()),
            Script::Segment(SEGMENT),
            Script::Segment(SEGMENT),
        ]);
        let (tx, mut rx) = mpsc::channel::<LiveItem>(1);
        let registry = RecordingRegistry::new();
        let mut session = session();

        let client = tokio::spawn(async move {
            let first = rx.recv().await.unwrap().unwrap();
            drop(rx);
            gate.notify_one();
            first
        });

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, Some(tx), &CancellationToken::new(), &registry)
            .await;

        let first = client.await.unwrap();
        assert_eq!(first.len(), WAV_HEADER_LEN + SEGMENT * 2);

        let ForwardOutcome::Completed { buffer, early_end } = outcome else {
            panic!("expected completion");
        };
        assert!(early_end.is_none());
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.len(), WAV_HEADER_LEN + 3 * SEGMENT * 2);
        assert_eq!(session.state(), SessionState::Degraded);
        assert_eq!(
            registry.states(),
            vec![SessionState::Streaming, SessionState::Degraded]
        );
    }

    #[tokio::test]
    async fn test_stalled_client_times_out_and_degrades() {
        let (_, mut stream) = spawn(vec![Script::FollowPlan]);
        // 容量 1 且无人读取：第二块写入超时
        let (tx, _rx) = mpsc::channel(1);
        let registry = RecordingRegistry::new();
        let mut session = session();
        let config = ForwarderConfig {
            live_send_timeout: Duration::from_millis(50),
            request_timeout: None,
        };

        let outcome = forwarder(config)
            .forward(&mut session, &mut stream, Some(tx), &CancellationToken::new(), &registry)
            .await;

        let ForwardOutcome::Completed { buffer, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(session.state(), SessionState::Degraded);
    }

    #[tokio::test]
    async fn test_immediate_failure_sends_no_audio() {
        let (_, mut stream) = spawn(vec![Script::Fail("model exploded".to_string())]);
        let (tx, rx) = mpsc::channel(2);
        let reader = collect(rx);
        let registry = RecordingRegistry::new();
        let mut session = session();

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, Some(tx), &CancellationToken::new(), &registry)
            .await;

        let (live_chunks, live_err) = reader.await.unwrap();
        assert!(live_chunks.is_empty());
        assert!(live_err.is_some());
        assert!(matches!(
            outcome,
            ForwardOutcome::ProducerFailed(GenerationError::Model(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.bytes_accumulated(), 0);
    }

    #[tokio::test]
    async fn test_failure_after_segments_ends_early() {
        let (_, mut stream) = spawn(vec![
            Script::Segment(SEGMENT),
            Script::Segment(SEGMENT),
            Script::Fail("out of memory".to_string()),
        ]);
        let (tx, rx) = mpsc::channel(2);
        let reader = collect(rx);
        let registry = RecordingRegistry::new();
        let mut session = session();

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, Some(tx), &CancellationToken::new(), &registry)
            .await;

        let (live_chunks, live_err) = reader.await.unwrap();
        assert_eq!(live_chunks.len(), 2);
        assert!(live_err.is_some());

        let ForwardOutcome::Completed { buffer, early_end } = outcome else {
            panic!("expected early completion");
        };
        assert_eq!(early_end, Some(GenerationError::Model("out of memory".to_string())));
        assert_eq!(buffer.len(), WAV_HEADER_LEN + 2 * SEGMENT * 2);
        assert_eq!(concat(&live_chunks), buffer.concat().to_vec());
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_abort_cancels_producer() {
        let (generator, mut stream) = spawn(vec![Script::Segment(SEGMENT), Script::WaitForCancel]);
        let registry = RecordingRegistry::new();
        let mut session = session();
        let abort = CancellationToken::new();

        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = forwarder(ForwarderConfig::default())
            .forward(&mut session, &mut stream, None, &abort, &registry)
            .await;

        let ForwardOutcome::Aborted { buffer, reason } = outcome else {
            panic!("expected abort");
        };
        assert_eq!(reason, AbortReason::Cancelled);
        assert_eq!(buffer.chunk_count(), 1);
        assert_eq!(session.state(), SessionState::Aborted);

        stream.close().await;
        assert!(generator.observed_cancel());
    }

    #[tokio::test]
    async fn test_request_deadline_aborts() {
        let (_, mut stream) = spawn(vec![Script::WaitForCancel]);
        let registry = RecordingRegistry::new();
        let mut session = session();
        let config = ForwarderConfig {
            live_send_timeout: Duration::from_secs(1),
            request_timeout: Some(Duration::from_millis(50)),
        };

        let outcome = forwarder(config)
            .forward(&mut session, &mut stream, None, &CancellationToken::new(), &registry)
            .await;

        assert!(matches!(
            outcome,
            ForwardOutcome::Aborted {
                reason: AbortReason::Deadline,
                ..
            }
        ));
    }

    #[test]
    fn test_chunk_buffer_concat() {
        let mut buffer = ChunkBuffer::new();
        assert!(buffer.is_empty());
        buffer.push(Bytes::from_static(b"RIFF"));
        buffer.push(Bytes::new());
        buffer.push(Bytes::from_static(b"data"));
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(&buffer.concat()[..], b"RIFFdata");
    }
}
