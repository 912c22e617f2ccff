use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use super::reconstruction::{group_by_index, Verified};
use super::ReplicaStore;
use crate::{FileChunk, FileId, NodeId, Result, StoredFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Intact,
    Missing,
    Corrupt,
}

#[derive(Debug, Clone)]
pub struct CopyReport {
    pub chunk: FileChunk,
    pub node: NodeId,
    pub status: CopyStatus,
}

#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub index: u64,
    pub copies: Vec<CopyReport>,
    /// The copy a download would read right now.
    pub selected: Option<FileChunk>,
    /// Bytes held by the selected copy.
    pub len: u64,
}

impl ChunkReport {
    pub fn is_recoverable(&self) -> bool {
        self.selected.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FileAudit {
    pub file: StoredFile,
    pub chunks: Vec<ChunkReport>,
}

impl FileAudit {
    pub fn is_healthy(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| chunk.copies.iter().all(|copy| copy.status == CopyStatus::Intact))
    }

    /// Every index from 0 upward has at least one intact copy, and together
    /// they cover the whole file.
    pub fn is_recoverable(&self) -> bool {
        let contiguous = self
            .chunks
            .iter()
            .enumerate()
            .all(|(position, chunk)| chunk.index == position as u64 && chunk.is_recoverable());
        contiguous && self.chunks.iter().map(|chunk| chunk.len).sum::<u64>() == self.file.size
    }

    pub fn damaged_copies(&self) -> usize {
        self.chunks
            .iter()
            .flat_map(|chunk| &chunk.copies)
            .filter(|copy| copy.status != CopyStatus::Intact)
            .count()
    }
}

/// Chunk records held by one node.
#[derive(Debug, Clone)]
pub struct NodeUsage {
    pub node: NodeId,
    /// `None` for nodes that appear in records but not in the registry.
    pub root: Option<PathBuf>,
    pub load: u64,
    pub chunks: Vec<FileChunk>,
}

impl ReplicaStore {
    pub async fn list_files(&self) -> Result<Vec<StoredFile>> {
        self.metadata.list_files().await
    }

    /// Every chunk record grouped by the node holding it, registry order first.
    pub async fn chunks_by_node(&self) -> Result<Vec<NodeUsage>> {
        let mut grouped: BTreeMap<NodeId, Vec<FileChunk>> = BTreeMap::new();
        for chunk in self.metadata.list_all_chunks().await? {
            grouped.entry(self.node_of(&chunk)).or_default().push(chunk);
        }

        let mut usage = Vec::with_capacity(grouped.len().max(self.registry.len()));
        for node in self.registry.nodes() {
            usage.push(NodeUsage {
                node: node.id.clone(),
                root: Some(node.root.clone()),
                load: self.registry.load_of(&node.id).await?,
                chunks: grouped.remove(&node.id).unwrap_or_default(),
            });
        }
        for (node, chunks) in grouped {
            let load = chunks.iter().filter(|chunk| chunk.is_primary()).count() as u64;
            usage.push(NodeUsage {
                node,
                root: None,
                load,
                chunks,
            });
        }
        Ok(usage)
    }

    /// Checks every copy of every chunk without failing on damage.
    pub async fn audit(&self, file_id: &FileId) -> Result<FileAudit> {
        let file = self.get_file(file_id).await?;
        let chunks = self.metadata.list_chunks(file_id).await?;

        let mut reports = Vec::new();
        for (index, candidates) in group_by_index(chunks) {
            let mut copies = Vec::with_capacity(candidates.len());
            let mut survivors = Vec::new();
            for candidate in candidates {
                let status = match self.verify_copy(&candidate).await? {
                    Verified::Intact(bytes) => {
                        survivors.push((candidate.clone(), bytes.len() as u64));
                        CopyStatus::Intact
                    }
                    Verified::Missing => CopyStatus::Missing,
                    Verified::Corrupt { .. } => CopyStatus::Corrupt,
                };
                copies.push(CopyReport {
                    node: self.node_of(&candidate),
                    chunk: candidate,
                    status,
                });
            }

            let (selected, len) = match self.least_loaded(survivors).await? {
                Some((chunk, len)) => (Some(chunk), len),
                None => (None, 0),
            };
            reports.push(ChunkReport {
                index,
                copies,
                selected,
                len,
            });
        }

        let audit = FileAudit { file, chunks: reports };
        if !audit.is_healthy() {
            warn!(
                "Audit of {}: {} damaged copies, recoverable: {}",
                file_id,
                audit.damaged_copies(),
                audit.is_recoverable()
            );
        }
        Ok(audit)
    }

    /// Removes a file's records, then its physical copies. Copies that cannot
    /// be removed are logged and left behind.
    pub async fn delete(&self, file_id: &FileId) -> Result<()> {
        let removed = self.metadata.delete_file(file_id).await?;
        for chunk in &removed {
            if let Err(e) = self.chunks.delete(&chunk.path).await {
                warn!("Failed to delete chunk copy {}: {}", chunk.path.display(), e);
            }
        }
        info!("Deleted {} and {} chunk copies", file_id, removed.len());
        Ok(())
    }
}
