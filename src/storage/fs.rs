use crate::storage::{ContentStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Blobs stored as files below a root directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a blob name onto a path below the root, refusing anything that
    /// could escape it
    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let normal = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if name.is_empty() || !normal {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, name: &str, content: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        if fs::try_exists(&path).await? {
            debug!(name = %name, "Blob already stored");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers never observe a partially written blob
        let staging = path.with_extension(format!("{}.partial", Uuid::now_v7()));
        fs::write(&staging, &content).await?;
        if let Err(error) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            if fs::try_exists(&path).await.unwrap_or(false) {
                debug!(name = %name, error = %error, "Blob written concurrently, keeping existing");
                return Ok(());
            }
            return Err(error.into());
        }
        Ok(())
    }
}
