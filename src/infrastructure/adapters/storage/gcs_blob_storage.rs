//! GCS Blob Storage - Google Cloud Storage 对象存储
//!
//! 使用 JSON API 的 media 上传：
//! POST {endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}
//! Authorization: Bearer {token}

use async_trait::async_trait;
use reqwest::{Body, Client};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::application::ports::{validate_object_key, BlobStoragePort, StorageError};

/// GCS 存储配置
#[derive(Debug, Clone)]
pub struct GcsBlobStorageConfig {
    pub bucket: String,
    /// OAuth2 访问令牌
    pub access_token: String,
    /// API 地址（测试时指向本地模拟服务）
    pub endpoint: String,
    /// 对象公开访问前缀
    pub public_base_url: String,
    pub timeout_secs: u64,
}

impl GcsBlobStorageConfig {
    pub fn new(bucket: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            access_token: access_token.into(),
            endpoint: "https://storage.googleapis.com".to_string(),
            public_base_url: "https://storage.googleapis.com".to_string(),
            timeout_secs: 300,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// GCS 对象存储
pub struct GcsBlobStorage {
    client: Client,
    config: GcsBlobStorageConfig,
}

impl GcsBlobStorage {
    pub fn new(config: GcsBlobStorageConfig) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::Unavailable("bucket is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket
        )
    }
}

#[async_trait]
impl BlobStoragePort for GcsBlobStorage {
    async fn upload_file(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_object_key(key)?;

        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?
            .len();

        tracing::debug!(
            bucket = %self.config.bucket,
            key = %key,
            size,
            "Uploading object to GCS"
        );

        let response = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    StorageError::Unavailable(e.to_string())
                } else {
                    StorageError::UploadFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, error_text);
            return Err(if status.is_server_error() {
                StorageError::Unavailable(message)
            } else {
                StorageError::UploadFailed(message)
            });
        }

        Ok(self.locator(key))
    }

    fn locator(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.bucket,
            key
        )
    }
}
