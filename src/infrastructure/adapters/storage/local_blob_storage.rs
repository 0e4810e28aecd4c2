//! Local Blob Storage - 以本地目录作为对象存储
//!
//! 实现 BlobStoragePort trait；key 映射为目录下的相对路径

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::application::ports::{validate_object_key, BlobStoragePort, StorageError};

/// 本地目录对象存储
pub struct LocalBlobStorage {
    /// 存储根目录
    base_dir: PathBuf,
    /// 对外访问前缀，为空时返回 file:// 定位串
    public_base_url: Option<String>,
}

impl LocalBlobStorage {
    /// 创建新的本地存储
    pub async fn new(
        base_dir: impl AsRef<Path>,
        public_base_url: Option<String>,
    ) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        // 确保目录存在
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;
        let base_dir = fs::canonicalize(&base_dir)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        Ok(Self {
            base_dir,
            public_base_url: public_base_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    /// 获取存储根目录
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

#[async_trait]
impl BlobStoragePort for LocalBlobStorage {
    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        validate_object_key(key)?;
        let target = self.object_path(key);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::IoError(e.to_string()))?;
        }

        // 先复制到临时名再改名，读者不会看到写了一半的对象
        let partial = target.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        let copied = fs::copy(source, &partial)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(StorageError::UploadFailed(e.to_string()));
        }

        tracing::debug!(key = %key, size = copied, path = %target.display(), "Stored object");

        Ok(self.locator(key))
    }

    fn locator(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("file://{}", self.object_path(key).display()),
        }
    }
}
