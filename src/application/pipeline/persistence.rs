//! Persistence Sink - 累积音频落盘并上传
//!
//! 累积字节先写入暂存文件，再交给对象存储上传。无论上传成功与否，暂存文件都会删除。

use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use super::forwarder::ChunkBuffer;
use super::framer::{
    riff_size_for, DATA_SIZE_OFFSET, RIFF_SIZE_OFFSET, WAV_CONTENT_TYPE, WAV_HEADER_LEN,
};
use crate::application::ports::{BlobStoragePort, StorageError};
use crate::domain::generation::RequestId;

/// 持久化副本的 WAV 头处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// 原样保存，头中保留流式哨兵长度
    #[default]
    Sentinel,
    /// 写完后回填真实长度
    Patch,
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("没有可保存的音频")]
    Empty,

    #[error("暂存文件写入失败: {0}")]
    Staging(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 对象键：`{request_id}/output.wav`
pub fn object_key(request_id: &RequestId) -> String {
    format!("{}/output.wav", request_id)
}

/// 暂存文件
///
/// 显式 `remove` 或析构时删除
struct StagedFile {
    path: PathBuf,
    removed: bool,
}

impl StagedFile {
    async fn write(
        staging_dir: &Path,
        request_id: &RequestId,
        buffer: &ChunkBuffer,
        header_policy: HeaderPolicy,
    ) -> Result<Self, PersistenceError> {
        fs::create_dir_all(staging_dir)
            .await
            .map_err(|e| PersistenceError::Staging(e.to_string()))?;

        // 同一请求 ID 的并发请求不能互相覆盖
        let path = staging_dir.join(format!("{}-{}.wav", request_id, Uuid::new_v4()));
        let staged = Self {
            path,
            removed: false,
        };

        let mut file = fs::File::create(&staged.path)
            .await
            .map_err(|e| PersistenceError::Staging(e.to_string()))?;

        for chunk in buffer.chunks() {
            file.write_all(chunk)
                .await
                .map_err(|e| PersistenceError::Staging(e.to_string()))?;
        }

        if header_policy == HeaderPolicy::Patch && buffer.len() >= WAV_HEADER_LEN {
            let data_size = u32::try_from(buffer.len() - WAV_HEADER_LEN).unwrap_or(u32::MAX);
            patch_lengths(&mut file, data_size)
                .await
                .map_err(|e| PersistenceError::Staging(e.to_string()))?;
        }

        file.flush()
            .await
            .map_err(|e| PersistenceError::Staging(e.to_string()))?;

        Ok(staged)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
        }
        self.removed = true;
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn patch_lengths(file: &mut fs::File, data_size: u32) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(RIFF_SIZE_OFFSET)).await?;
    file.write_all(&riff_size_for(data_size).to_le_bytes()).await?;
    file.seek(SeekFrom::Start(DATA_SIZE_OFFSET)).await?;
    file.write_all(&data_size.to_le_bytes()).await?;
    Ok(())
}

/// 持久化端
pub struct PersistenceSink {
    storage: Arc<dyn BlobStoragePort>,
    staging_dir: PathBuf,
    header_policy: HeaderPolicy,
}

impl PersistenceSink {
    pub fn new(
        storage: Arc<dyn BlobStoragePort>,
        staging_dir: impl Into<PathBuf>,
        header_policy: HeaderPolicy,
    ) -> Self {
        Self {
            storage,
            staging_dir: staging_dir.into(),
            header_policy,
        }
    }

    pub fn header_policy(&self) -> HeaderPolicy {
        self.header_policy
    }

    /// 保存累积的音频，返回存储位置
    pub async fn persist(
        &self,
        request_id: &RequestId,
        buffer: &ChunkBuffer,
    ) -> Result<String, PersistenceError> {
        if buffer.is_empty() {
            return Err(PersistenceError::Empty);
        }

        let key = object_key(request_id);
        let staged =
            StagedFile::write(&self.staging_dir, request_id, buffer, self.header_policy).await?;

        let result = self
            .storage
            .upload_file(&key, staged.path(), WAV_CONTENT_TYPE)
            .await;
        staged.remove().await;

        let locator = result?;
        tracing::info!(
            request_id = %request_id,
            key = %key,
            bytes = buffer.len(),
            locator = %locator,
            "Audio persisted"
        );
        Ok(locator)
    }
}
