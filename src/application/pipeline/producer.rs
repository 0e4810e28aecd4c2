//! Segment Producer - 后台生成任务
//!
//! 在独立的 tokio 任务上驱动生成器，经有界队列把分段交给转发器

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{GenerationError, MusicGeneratorPort, SegmentItem, SegmentSink};
use crate::domain::generation::{AudioSegment, GenerationRequest, SegmentPlan};

/// 交接队列允许的最大容量
pub const MAX_QUEUE_CAPACITY: usize = 4;

/// `close` 等待生产者自行退出的时间，超时后强制中止
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 分段生产者
pub struct SegmentProducer;

impl SegmentProducer {
    /// 启动后台生成任务
    ///
    /// `capacity` 会被限制在 `1..=MAX_QUEUE_CAPACITY`
    pub fn spawn(
        generator: Arc<dyn MusicGeneratorPort>,
        request: GenerationRequest,
        plan: SegmentPlan,
        capacity: usize,
    ) -> SegmentStream {
        let capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        let (tx, rx) = mpsc::channel::<SegmentItem>(capacity);
        let cancel = CancellationToken::new();

        let producer_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let request_id = request.request_id().clone();
            let mut sink = SegmentSink::new(tx.clone(), producer_cancel);

            tracing::debug!(
                request_id = %request_id,
                segments = plan.segment_count(),
                capacity,
                "Segment producer started"
            );

            match generator.generate(&request, &plan, &mut sink).await {
                Ok(()) => {
                    tracing::debug!(
                        request_id = %request_id,
                        delivered = sink.delivered(),
                        "Segment producer finished"
                    );
                }
                Err(GenerationError::Cancelled) => {
                    tracing::debug!(
                        request_id = %request_id,
                        delivered = sink.delivered(),
                        "Segment producer cancelled"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        delivered = sink.delivered(),
                        error = %e,
                        "Segment producer failed"
                    );
                    // 终止信号；接收端已关闭时无人关心
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        SegmentStream {
            rx,
            cancel,
            handle: Some(handle),
            finished: false,
        }
    }
}

/// 分段流（转发器一侧）
///
/// 有限、按生成顺序、不可重启。丢弃时会取消生产者。
pub struct SegmentStream {
    rx: mpsc::Receiver<SegmentItem>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl SegmentStream {
    /// 下一段；`Some(Err)` 为终止失败，`None` 为正常结束
    pub async fn next(&mut self) -> Option<Result<AudioSegment, GenerationError>> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(Ok(segment)) => Some(Ok(segment)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                // 所有发送端已释放，说明任务已经结束；区分正常结束和 panic
                let handle = self.handle.take()?;
                match handle.await {
                    Err(join_err) if join_err.is_panic() => Some(Err(
                        GenerationError::Interrupted("generator task panicked".to_string()),
                    )),
                    _ => None,
                }
            }
        }
    }

    /// 通知生产者停止
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 停止生产者并回收其任务
    pub async fn close(mut self) {
        self.cancel.cancel();
        self.rx.close();
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                tracing::warn!("Segment producer did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
        self.finished = true;
    }
}

impl Drop for SegmentStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{request, Script, ScriptedGenerator};

    fn plan() -> SegmentPlan {
        SegmentPlan::new(800, 50, 12, 4.0).unwrap()
    }

    #[tokio::test]
    async fn test_segments_arrive_in_generation_order() {
        let generator = ScriptedGenerator::new(vec![
            Script::Segment(4),
            Script::Segment(4),
            Script::Segment(2),
        ]);
        let mut stream = SegmentProducer::spawn(Arc::new(generator), request(12), plan(), 2);

        let mut indices = Vec::new();
        while let Some(item) = stream.next().await {
            indices.push(item.unwrap().index);
        }

        assert_eq!(indices, vec![0, 1, 2]);
        assert!(stream.next().await.is_none());
        stream.close().await;
    }

    #[tokio::test]
    async fn test_failure_is_terminal_signal() {
        let generator = ScriptedGenerator::new(vec![
            Script::Segment(4),
            Script::Fail("boom".to_string()),
            Script::Segment(4),
        ]);
        let mut stream = SegmentProducer::spawn(Arc::new(generator), request(12), plan(), 2);

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(
            stream.next().await.unwrap(),
            Err(GenerationError::Model("boom".to_string()))
        );
        assert!(stream.next().await.is_none());
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn test_queue_bounds_in_flight_segments() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Script::Segment(4); 10]));
        let stream = SegmentProducer::spawn(generator.clone(), request(12), plan(), 2);

        // 没有人消费：生产者最多放入 capacity 段后挂起
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(generator.sent(), 2);

        stream.close().await;
        assert_eq!(generator.sent(), 2);
    }

    #[tokio::test]
    async fn test_capacity_is_clamped() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Script::Segment(1); 10]));
        let stream = SegmentProducer::spawn(generator.clone(), request(12), plan(), 64);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(generator.sent(), MAX_QUEUE_CAPACITY);
        stream.close().await;
    }

    #[tokio::test]
    async fn test_panicking_generator_is_reported() {
        let generator = ScriptedGenerator::new(vec![Script::Segment(2), Script::Panic]);
        let mut stream = SegmentProducer::spawn(Arc::new(generator), request(12), plan(), 2);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await,
            Some(Err(GenerationError::Interrupted(_)))
        ));
    }

    #[tokio::test]
    async fn test_drop_cancels_producer() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Script::Segment(1),
            Script::WaitForCancel,
        ]));
        let stream = SegmentProducer::spawn(generator.clone(), request(12), plan(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(generator.observed_cancel());
    }
}
