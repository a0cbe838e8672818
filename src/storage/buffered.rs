use crate::cache::{EntryOptions, SharedCache};
use crate::storage::{ContentStore, StorageError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Keeps small blobs in the shared cache tier in front of a slower store.
///
/// Blobs up to `max_bytes` are written to both; reads try the shared tier
/// first and back-fill it on a miss. Shared tier faults fall through to the
/// inner store.
pub struct BufferedContentStore<S> {
    inner: S,
    shared: Arc<dyn SharedCache>,
    max_bytes: usize,
    sliding: Duration,
}

impl<S: ContentStore> BufferedContentStore<S> {
    pub fn new(inner: S, shared: Arc<dyn SharedCache>, max_bytes: usize, sliding: Duration) -> Self {
        Self {
            inner,
            shared,
            max_bytes,
            sliding,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn buffer_key(name: &str) -> String {
        format!("blob|{name}")
    }

    async fn buffered(&self, name: &str) -> Option<Bytes> {
        match self.shared.get(&Self::buffer_key(name)).await {
            Ok(Some(encoded)) => match STANDARD.decode(encoded) {
                Ok(content) if !content.is_empty() => Some(Bytes::from(content)),
                Ok(_) => None,
                Err(error) => {
                    warn!(name = %name, error = %error, "Buffered blob is not valid base64");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(name = %name, error = %error, "Blob buffer read failed");
                None
            }
        }
    }

    async fn buffer(&self, name: &str, content: &Bytes) {
        if content.len() > self.max_bytes {
            return;
        }
        let result = self
            .shared
            .set(
                &Self::buffer_key(name),
                STANDARD.encode(content),
                EntryOptions::sliding(self.sliding),
            )
            .await;
        if let Err(error) = result {
            warn!(name = %name, error = %error, "Blob buffer write failed");
        }
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for BufferedContentStore<S> {
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        if self.buffered(name).await.is_some() {
            return Ok(true);
        }
        self.inner.exists(name).await
    }

    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        if let Some(content) = self.buffered(name).await {
            debug!(name = %name, "Blob served from buffer");
            return Ok(content);
        }
        let content = self.inner.read(name).await?;
        self.buffer(name, &content).await;
        Ok(content)
    }

    async fn write(&self, name: &str, content: Bytes) -> Result<(), StorageError> {
        self.buffer(name, &content).await;
        self.inner.write(name, content).await
    }
}
