//! Blob Storage Port - 出站端口
//!
//! 定义生成结果对象存储的抽象接口

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// 对象存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// 校验对象 key（相对路径、无 `..`、无空段）
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Blob Storage Port - 出站端口
///
/// 同一个 key 重复上传覆盖旧对象，不产生副本
#[async_trait]
pub trait BlobStoragePort: Send + Sync {
    /// 上传本地文件到 `key`，返回对象的公开定位串
    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// 计算 `key` 对应的公开定位串
    fn locator(&self, key: &str) -> String;
}
