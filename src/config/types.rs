//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::{AbortPolicy, HeaderPolicy};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 生成模型配置
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// 流式管线配置
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 生成后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorBackend {
    /// 本地合成（开发、测试）
    #[default]
    Synthetic,
    /// 外部 HTTP 推理服务
    Http,
}

/// 生成模型配置
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub backend: GeneratorBackend,

    /// 推理服务基础 URL（backend = http 时使用）
    #[serde(default = "default_generator_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub model_name: Option<String>,

    /// 输出采样率（Hz）
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// token 帧率（每秒 token 数）
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// 每段音频的时长（秒）
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: f32,

    /// 本地合成时每段模拟的推理耗时（毫秒）
    #[serde(default)]
    pub synthetic_delay_ms: u64,

    /// 请求未指定种子时使用的固定种子
    #[serde(default)]
    pub default_seed: u64,
}

fn default_generator_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_generator_timeout() -> u64 {
    600
}

fn default_sample_rate() -> u32 {
    32000
}

fn default_frame_rate() -> u32 {
    50
}

fn default_segment_duration() -> f32 {
    4.0
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::default(),
            url: default_generator_url(),
            timeout_secs: default_generator_timeout(),
            model_name: None,
            sample_rate: default_sample_rate(),
            frame_rate: default_frame_rate(),
            segment_duration_secs: default_segment_duration(),
            synthetic_delay_ms: 0,
            default_seed: 0,
        }
    }
}

/// 流式管线配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// 生产者交接队列容量（1-4）
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 直播通道可缓冲的块数
    #[serde(default = "default_live_buffer_chunks")]
    pub live_buffer_chunks: usize,

    /// 单块直播写入的超时（秒）
    #[serde(default = "default_live_send_timeout")]
    pub live_send_timeout_secs: u64,

    /// 整个请求的期限（秒），0 表示不限
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub abort_policy: AbortPolicy,

    #[serde(default)]
    pub header_policy: HeaderPolicy,

    /// 已关闭会话在状态查询中保留的时间（秒）
    #[serde(default = "default_status_retention")]
    pub status_retention_secs: u64,

    /// 服务关闭时等待进行中的管线完成持久化的时间（秒）
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_queue_capacity() -> usize {
    2
}

fn default_live_buffer_chunks() -> usize {
    2
}

fn default_live_send_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    600
}

fn default_status_retention() -> u64 {
    3600
}

fn default_shutdown_grace() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            live_buffer_chunks: default_live_buffer_chunks(),
            live_send_timeout_secs: default_live_send_timeout(),
            request_timeout_secs: default_request_timeout(),
            abort_policy: AbortPolicy::default(),
            header_policy: HeaderPolicy::default(),
            status_retention_secs: default_status_retention(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    Gcs,
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// 本地对象存储目录
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// 上传前的暂存目录
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// 对外访问前缀
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// GCS bucket
    #[serde(default)]
    pub bucket: String,

    /// GCS OAuth2 访问令牌
    #[serde(default)]
    pub access_token: String,

    /// GCS API 地址
    #[serde(default = "default_gcs_endpoint")]
    pub gcs_endpoint: String,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local_dir: default_local_dir(),
            staging_dir: default_staging_dir(),
            public_base_url: None,
            bucket: String::new(),
            access_token: String::new(),
            gcs_endpoint: default_gcs_endpoint(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
