use crate::storage::{ContentStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn delete(&self, name: &str) {
        self.blobs.remove(name);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(name))
    }

    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        self.blobs
            .get(name)
            .map(|blob| blob.clone())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, content: Bytes) -> Result<(), StorageError> {
        self.blobs.entry(name.to_string()).or_insert(content);
        Ok(())
    }
}
