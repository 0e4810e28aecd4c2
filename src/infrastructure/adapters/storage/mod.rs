//! Storage Adapter - 对象存储实现

mod gcs_blob_storage;
mod local_blob_storage;

pub use gcs_blob_storage::{GcsBlobStorage, GcsBlobStorageConfig};
pub use local_blob_storage::LocalBlobStorage;
