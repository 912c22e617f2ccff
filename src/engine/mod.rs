//! Placement, replication, verification and reconstruction of chunked files.
//!
//! A [`ReplicaStore`] ties together the node registry, the metadata store and
//! the physical chunk store. Uploads are split into fixed-size chunks; each
//! chunk is written to a primary node and synchronously copied to the next
//! node in rotation. Downloads verify every copy against its recorded checksum
//! and read from the least-loaded node holding an intact copy.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Notify;
use tracing::info;

use crate::chunk::ChunkConfig;
use crate::config::Config;
use crate::metadata::{JsonMetadataStore, MetadataStore};
use crate::registry::NodeRegistry;
use crate::storage::{ChunkStore, DiskChunkStore};
use crate::{ChunkRole, FileId, Node, Result, StorageError, StoredFile};

mod diagnostics;
mod placement;
mod reconstruction;
mod recovery;
mod rollback;

pub use diagnostics::{ChunkReport, CopyReport, CopyStatus, FileAudit, NodeUsage};

pub struct ReplicaStore {
    registry: NodeRegistry,
    metadata: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    chunk_config: ChunkConfig,
    /// Signalled whenever an upload commits or rolls back.
    settled: Arc<Notify>,
}

impl ReplicaStore {
    pub fn new(
        nodes: Vec<Node>,
        metadata: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        chunk_config: ChunkConfig,
    ) -> Result<Self> {
        let registry = NodeRegistry::new(nodes, Arc::clone(&metadata))?;
        Ok(Self {
            registry,
            metadata,
            chunks,
            chunk_config,
            settled: Arc::new(Notify::new()),
        })
    }

    /// Opens the catalog and node roots described by `config` on local disk.
    /// Uploads a previous run left pending are discarded first.
    pub async fn open(config: &Config) -> Result<Self> {
        for node in &config.nodes {
            fs::create_dir_all(&node.root).await?;
        }

        let metadata = Arc::new(JsonMetadataStore::open(&config.catalog_path).await?);
        let mut disk = DiskChunkStore::new();
        if let Some(retry) = config.retry_config() {
            disk = disk.with_retry(retry);
        }

        let store = Self::new(config.nodes.clone(), metadata, Arc::new(disk), config.chunk_config()?)?;
        let discarded = store.recover().await?;
        info!(
            "Replica store ready: {} nodes, {} byte chunks, {} unfinished uploads discarded",
            store.registry.len(),
            store.chunk_config.chunk_size(),
            discarded
        );
        Ok(store)
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        self.chunk_config
    }

    pub async fn get_file(&self, id: &FileId) -> Result<StoredFile> {
        self.metadata
            .get_file(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn chunk_path(node: &Node, file_id: &FileId, index: u64, role: ChunkRole) -> PathBuf {
        let name = match role {
            ChunkRole::Primary => format!("{}_chunk_{}", file_id, index),
            ChunkRole::Replica => format!("{}_chunk_{}_replica", file_id, index),
        };
        node.root.join(name)
    }
}
