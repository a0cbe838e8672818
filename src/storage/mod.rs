//! Content store for multimedia payloads too large to keep in the cache tiers

mod buffered;
mod fs;
mod memory;

pub use buffered::BufferedContentStore;
pub use fs::FsContentStore;
pub use memory::InMemoryContentStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write-once blob storage keyed by name.
///
/// Names are content addressed, so writing a blob that already exists is not
/// an error: implementations keep the existing blob and return `Ok`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    async fn read(&self, name: &str) -> Result<Bytes, StorageError>;

    async fn write(&self, name: &str, content: Bytes) -> Result<(), StorageError>;
}
