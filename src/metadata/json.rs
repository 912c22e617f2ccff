use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use super::catalog::{Catalog, Snapshot};
use super::MetadataStore;
use crate::{FileChunk, FileId, NodeId, OwnerId, Result, StoredFile};

/// Catalog held in memory, optionally mirrored to a JSON file.
///
/// Every mutation runs under one lock. When a path is configured the snapshot
/// is rewritten when a file is created, committed or deleted; chunk records of
/// an upload in progress stay in memory until its commit.
pub struct JsonMetadataStore {
    path: Option<PathBuf>,
    catalog: Mutex<Catalog>,
}

impl JsonMetadataStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            catalog: Mutex::new(Catalog::default()),
        }
    }

    /// Loads the catalog at `path`, starting empty if the file does not exist.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let catalog = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            Catalog::from_snapshot(snapshot)?
        } else {
            Catalog::default()
        };
        info!("Metadata catalog opened at {}", path.display());

        Ok(Self {
            path: Some(path),
            catalog: Mutex::new(catalog),
        })
    }

    async fn persist(&self, catalog: &Catalog) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(&catalog.to_snapshot())?;
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, content).await?;
        fs::rename(&temp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn create_file(
        &self,
        name: &str,
        owner: Option<&OwnerId>,
        size: u64,
        checksum: &str,
    ) -> Result<FileId> {
        let mut catalog = self.catalog.lock().await;
        let id = catalog.create_file(name, owner, size, checksum)?;
        if let Err(e) = self.persist(&catalog).await {
            catalog.delete_file(&id)?;
            return Err(e);
        }
        Ok(id)
    }

    async fn commit_file(&self, id: &FileId) -> Result<()> {
        let mut catalog = self.catalog.lock().await;
        catalog.commit_file(id)?;
        if let Err(e) = self.persist(&catalog).await {
            catalog.revert_commit(id);
            return Err(e);
        }
        Ok(())
    }

    async fn find_file_by_checksum(&self, checksum: &str) -> Result<Option<StoredFile>> {
        Ok(self.catalog.lock().await.find_file_by_checksum(checksum))
    }

    async fn get_file(&self, id: &FileId) -> Result<Option<StoredFile>> {
        Ok(self.catalog.lock().await.get_file(id))
    }

    async fn list_files(&self) -> Result<Vec<StoredFile>> {
        Ok(self.catalog.lock().await.list_files())
    }

    async fn delete_file(&self, id: &FileId) -> Result<Vec<FileChunk>> {
        let mut catalog = self.catalog.lock().await;
        let removed = catalog.delete_file(id)?;
        self.persist(&catalog).await?;
        Ok(removed)
    }

    /// Held in memory only; the records reach disk with `commit_file`.
    async fn create_chunk(&self, chunk: FileChunk) -> Result<()> {
        self.catalog.lock().await.create_chunk(chunk)
    }

    async fn list_chunks(&self, file_id: &FileId) -> Result<Vec<FileChunk>> {
        Ok(self.catalog.lock().await.list_chunks(file_id))
    }

    async fn list_all_chunks(&self) -> Result<Vec<FileChunk>> {
        Ok(self.catalog.lock().await.list_all_chunks())
    }

    async fn count_primary_chunks_by_node(&self, node: &NodeId) -> Result<u64> {
        Ok(self.catalog.lock().await.count_primary_chunks_by_node(node))
    }
}
