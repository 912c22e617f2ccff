use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::retry::{with_retry, RetryConfig};
use crate::{Result, StorageError};

/// Byte-level access to node storage. Paths are absolute locations under a
/// node root.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    /// Fails with [`StorageError::NotFound`] when nothing is stored at `path`.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    async fn exists(&self, path: &Path) -> Result<bool>;
    /// Removing an absent path succeeds.
    async fn delete(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct DiskChunkStore {
    retry: Option<RetryConfig>,
}

impl DiskChunkStore {
    pub fn new() -> Self {
        Self { retry: None }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".partial");
        path.with_file_name(name)
    }

    async fn write_once(path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = Self::partial_path(path);
        if let Err(e) = fs::write(&partial, data).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        fs::rename(&partial, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for DiskChunkStore {
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        debug!("writing {} bytes to {}", data.len(), path.display());
        match &self.retry {
            Some(retry) => with_retry(retry, move || Self::write_once(path, data)).await,
            None => Self::write_once(path, data).await,
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to delete chunk {}: {}", path.display(), e);
                Err(StorageError::Io(e))
            }
        }
    }
}
