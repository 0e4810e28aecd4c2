//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, GeneratorBackend, StorageBackend};
use crate::application::pipeline::MAX_QUEUE_CAPACITY;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `TUNESTREAM_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `TUNESTREAM_SERVER__PORT=8080`
/// - `TUNESTREAM_GENERATOR__BACKEND=http`
/// - `TUNESTREAM_GENERATOR__URL=http://musicgen:9000`
/// - `TUNESTREAM_STORAGE__BACKEND=gcs`
/// - `TUNESTREAM_PIPELINE__ABORT_POLICY=persist_partial`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("generator.backend", "synthetic")?
        .set_default("generator.url", "http://localhost:9000")?
        .set_default("generator.timeout_secs", 600)?
        .set_default("generator.sample_rate", 32000)?
        .set_default("generator.frame_rate", 50)?
        .set_default("generator.segment_duration_secs", 4.0)?
        .set_default("generator.synthetic_delay_ms", 0)?
        .set_default("generator.default_seed", 0)?
        .set_default("pipeline.queue_capacity", 2)?
        .set_default("pipeline.live_buffer_chunks", 2)?
        .set_default("pipeline.live_send_timeout_secs", 30)?
        .set_default("pipeline.request_timeout_secs", 600)?
        .set_default("pipeline.abort_policy", "discard")?
        .set_default("pipeline.header_policy", "sentinel")?
        .set_default("pipeline.status_retention_secs", 3600)?
        .set_default("pipeline.shutdown_grace_secs", 30)?
        .set_default("storage.backend", "local")?
        .set_default("storage.local_dir", "data/objects")?
        .set_default("storage.staging_dir", "data/staging")?
        .set_default("storage.gcs_endpoint", "https://storage.googleapis.com")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级），变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("TUNESTREAM")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    let generator = &config.generator;
    if generator.backend == GeneratorBackend::Http && generator.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Generator URL cannot be empty for the http backend".to_string(),
        ));
    }
    if generator.frame_rate == 0 || generator.sample_rate < generator.frame_rate {
        return Err(ConfigError::ValidationError(format!(
            "Invalid generator rates: sample_rate={}, frame_rate={}",
            generator.sample_rate, generator.frame_rate
        )));
    }
    if !(generator.segment_duration_secs > 0.0) {
        return Err(ConfigError::ValidationError(
            "Segment duration must be positive".to_string(),
        ));
    }

    let pipeline = &config.pipeline;
    if pipeline.queue_capacity == 0 || pipeline.queue_capacity > MAX_QUEUE_CAPACITY {
        return Err(ConfigError::ValidationError(format!(
            "Queue capacity must be between 1 and {}, got {}",
            MAX_QUEUE_CAPACITY, pipeline.queue_capacity
        )));
    }
    if pipeline.live_buffer_chunks == 0 {
        return Err(ConfigError::ValidationError(
            "Live buffer must hold at least one chunk".to_string(),
        ));
    }
    if pipeline.live_send_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Live send timeout cannot be 0".to_string(),
        ));
    }

    let storage = &config.storage;
    if storage.staging_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "Staging directory cannot be empty".to_string(),
        ));
    }
    match storage.backend {
        StorageBackend::Local if storage.local_dir.as_os_str().is_empty() => {
            return Err(ConfigError::ValidationError(
                "Local storage directory cannot be empty".to_string(),
            ));
        }
        StorageBackend::Gcs if storage.bucket.is_empty() => {
            return Err(ConfigError::ValidationError(
                "GCS bucket cannot be empty".to_string(),
            ));
        }
        _ => {}
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Generator Backend: {:?}", config.generator.backend);
    if config.generator.backend == GeneratorBackend::Http {
        tracing::info!("Generator URL: {}", config.generator.url);
        tracing::info!("Generator Timeout: {}s", config.generator.timeout_secs);
    }
    tracing::info!(
        "Audio: {} Hz, {} frames/s, {}s segments",
        config.generator.sample_rate,
        config.generator.frame_rate,
        config.generator.segment_duration_secs
    );
    tracing::info!("Default Seed: {}", config.generator.default_seed);
    tracing::info!("Queue Capacity: {}", config.pipeline.queue_capacity);
    tracing::info!("Request Timeout: {}s", config.pipeline.request_timeout_secs);
    tracing::info!("Abort Policy: {:?}", config.pipeline.abort_policy);
    tracing::info!("Header Policy: {:?}", config.pipeline.header_policy);
    tracing::info!("Storage Backend: {:?}", config.storage.backend);
    match config.storage.backend {
        StorageBackend::Local => {
            tracing::info!("Storage Directory: {:?}", config.storage.local_dir)
        }
        StorageBackend::Gcs => tracing::info!("GCS Bucket: {}", config.storage.bucket),
    }
    tracing::info!("Staging Directory: {:?}", config.storage.staging_dir);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AbortPolicy, HeaderPolicy};
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_queue_capacity() {
        let mut config = AppConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
        config.pipeline.queue_capacity = 5;
        assert!(validate_config(&config).is_err());
        config.pipeline.queue_capacity = 4;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_http_backend_without_url() {
        let mut config = AppConfig::default();
        config.generator.url = String::new();
        assert!(validate_config(&config).is_ok());
        config.generator.backend = GeneratorBackend::Http;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_bad_rates() {
        let mut config = AppConfig::default();
        config.generator.frame_rate = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.generator.segment_duration_secs = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_gcs_without_bucket() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Gcs;
        assert!(validate_config(&config).is_err());
        config.storage.bucket = "tunes".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[generator]
backend = "http"
url = "http://musicgen:9000"

default_seed = 1234

[pipeline]
abort_policy = "persist_partial"
header_policy = "patch"
queue_capacity = 3
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.generator.backend, GeneratorBackend::Http);
        assert_eq!(config.generator.url, "http://musicgen:9000");
        assert_eq!(config.generator.sample_rate, 32000);
        assert_eq!(config.generator.default_seed, 1234);
        assert_eq!(config.pipeline.abort_policy, AbortPolicy::PersistPartial);
        assert_eq!(config.pipeline.header_policy, HeaderPolicy::Patch);
        assert_eq!(config.pipeline.queue_capacity, 3);
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\nqueue_capacity = 9").unwrap();

        let result = load_config_from_path(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
