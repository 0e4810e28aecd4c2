//! 测试用的生成器、存储和会话登记替身

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::application::ports::{
    BlobStoragePort, GenerationError, MusicGeneratorPort, SegmentSink, SessionRegistryPort,
    StorageError,
};
use crate::domain::generation::{
    GenerationRequest, Prompt, RequestId, SegmentPlan, SessionSnapshot, SessionState,
};

pub const TEST_SAMPLE_RATE: u32 = 800;
pub const TEST_FRAME_RATE: u32 = 50;

pub fn request(duration: u32) -> GenerationRequest {
    request_with_id("req-1", duration)
}

pub fn request_with_id(id: &str, duration: u32) -> GenerationRequest {
    GenerationRequest::new(
        RequestId::new(id).unwrap(),
        Prompt::new("calm piano").unwrap(),
        duration,
        4.0,
        0,
    )
    .unwrap()
}

/// 生成脚本的一步
#[derive(Debug, Clone)]
pub enum Script {
    /// 交付一段含 n 个采样的音频
    Segment(usize),
    /// 按规划交付剩余所有分段
    FollowPlan,
    Fail(String),
    Panic,
    WaitForCancel,
    WaitFor(Arc<Notify>),
}

/// 按脚本执行的生成器
pub struct ScriptedGenerator {
    script: Vec<Script>,
    sent: AtomicUsize,
    observed_cancel: AtomicBool,
    seeds: Mutex<Vec<u64>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            sent: AtomicUsize::new(0),
            observed_cancel: AtomicBool::new(false),
            seeds: Mutex::new(Vec::new()),
        }
    }

    /// 每次生成收到的种子
    pub fn seeds(&self) -> Vec<u64> {
        self.seeds.lock().unwrap().clone()
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn observed_cancel(&self) -> bool {
        self.observed_cancel.load(Ordering::SeqCst)
    }

    /// 第 index 段的采样值，用于校验顺序
    pub fn sample_value(index: usize) -> f32 {
        ((index % 9) + 1) as f32 * 0.1
    }

    async fn deliver(&self, sink: &mut SegmentSink, len: usize) -> Result<(), GenerationError> {
        let value = Self::sample_value(sink.delivered());
        sink.send(vec![value; len]).await?;
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MusicGeneratorPort for ScriptedGenerator {
    fn sample_rate(&self) -> u32 {
        TEST_SAMPLE_RATE
    }

    fn frame_rate(&self) -> u32 {
        TEST_FRAME_RATE
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        plan: &SegmentPlan,
        sink: &mut SegmentSink,
    ) -> Result<(), GenerationError> {
        self.seeds.lock().unwrap().push(request.seed());
        for step in &self.script {
            match step {
                Script::Segment(len) => self.deliver(sink, *len).await?,
                Script::FollowPlan => {
                    while let Some(len) = plan.segment_samples(sink.delivered()) {
                        self.deliver(sink, len).await?;
                    }
                }
                Script::Fail(message) => return Err(GenerationError::Model(message.clone())),
                Script::Panic => panic!("scripted generator panic"),
                Script::WaitForCancel => {
                    sink.cancellation().cancelled().await;
                    self.observed_cancel.store(true, Ordering::SeqCst);
                    return Err(GenerationError::Cancelled);
                }
                Script::WaitFor(notify) => {
                    tokio::select! {
                        _ = notify.notified() => {}
                        _ = sink.cancellation().cancelled() => {
                            self.observed_cancel.store(true, Ordering::SeqCst);
                            return Err(GenerationError::Cancelled);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// 内存对象存储
#[derive(Default)]
pub struct RecordingStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
    fail: AtomicBool,
    /// 设置后上传在收到通知前挂起
    gate: Option<Arc<Notify>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let storage = Self::default();
        storage.fail.store(true, Ordering::SeqCst);
        storage
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStoragePort for RecordingStorage {
    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("scripted failure".to_string()));
        }
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(self.locator(key))
    }

    fn locator(&self, key: &str) -> String {
        format!("mem://{}", key)
    }
}

/// 记录所有快照的会话登记
#[derive(Default)]
pub struct RecordingRegistry {
    snapshots: Mutex<Vec<SessionSnapshot>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.state)
            .collect()
    }
}

impl SessionRegistryPort for RecordingRegistry {
    fn record(&self, snapshot: &SessionSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn get(&self, request_id: &str) -> Option<SessionSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.request_id == request_id)
            .cloned()
    }

    fn active_count(&self) -> usize {
        let snapshots = self.snapshots.lock().unwrap();
        let mut latest: HashMap<&str, SessionState> = HashMap::new();
        for s in snapshots.iter() {
            latest.insert(s.request_id.as_str(), s.state);
        }
        latest
            .values()
            .filter(|state| **state != SessionState::Closed)
            .count()
    }
}
