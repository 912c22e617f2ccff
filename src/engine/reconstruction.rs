use tracing::{debug, info, warn};

use super::ReplicaStore;
use crate::chunk::calculate_checksum;
use crate::{FileChunk, FileId, NodeId, Result, StorageError, StoredFile};

/// Outcome of checking one physical copy against its record.
pub(super) enum Verified {
    Intact(Vec<u8>),
    Missing,
    Corrupt { actual: String },
}

impl ReplicaStore {
    /// Rebuilds the original bytes of a committed file.
    ///
    /// Every chunk index needs at least one copy whose content still matches
    /// its recorded checksum; otherwise the whole call fails with
    /// [`StorageError::ChunkMissing`] and no bytes are returned.
    pub async fn retrieve(&self, file_id: &FileId) -> Result<Vec<u8>> {
        let file = self.get_file(file_id).await?;
        if !file.is_committed() {
            return Err(StorageError::Incomplete(*file_id));
        }

        let chunks = self.metadata.list_chunks(file_id).await?;
        let mut data = Vec::with_capacity(file.size as usize);
        let mut expected = 0u64;

        for (index, candidates) in group_by_index(chunks) {
            if index != expected {
                return Err(chunk_missing(&file, expected));
            }

            let mut survivors = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                match self.verify_copy(&candidate).await? {
                    Verified::Intact(bytes) => survivors.push((candidate, bytes)),
                    Verified::Missing => {
                        warn!("chunk {} of {}: {} copy missing at {}", index, file_id, candidate.role, candidate.path.display());
                    }
                    Verified::Corrupt { actual } => {
                        warn!(
                            "chunk {} of {}: {} copy at {} fails checksum (expected {}, got {})",
                            index,
                            file_id,
                            candidate.role,
                            candidate.path.display(),
                            candidate.checksum,
                            actual
                        );
                    }
                }
            }

            let (selected, bytes) = self
                .least_loaded(survivors)
                .await?
                .ok_or_else(|| chunk_missing(&file, index))?;
            debug!("chunk {} of {}: reading {} copy from {}", index, file_id, selected.role, self.node_of(&selected));
            data.extend_from_slice(&bytes);
            expected += 1;
        }

        if data.len() as u64 != file.size {
            return Err(chunk_missing(&file, expected));
        }

        info!("Reconstructed '{}' ({}) from {} chunks", file.name, file_id, expected);
        Ok(data)
    }

    pub(super) async fn verify_copy(&self, chunk: &FileChunk) -> Result<Verified> {
        let data = match self.chunks.read(&chunk.path).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => return Ok(Verified::Missing),
            Err(e) => return Err(e),
        };

        let actual = calculate_checksum(&data);
        if actual == chunk.checksum {
            Ok(Verified::Intact(data))
        } else {
            Ok(Verified::Corrupt { actual })
        }
    }

    /// Picks the candidate whose node carries the fewest primary chunks right
    /// now. On equal load the earlier candidate wins, and candidates arrive
    /// primary first.
    pub(super) async fn least_loaded<T>(&self, candidates: Vec<(FileChunk, T)>) -> Result<Option<(FileChunk, T)>> {
        if candidates.len() <= 1 {
            return Ok(candidates.into_iter().next());
        }

        let mut selected: Option<(u64, FileChunk, T)> = None;
        for (candidate, value) in candidates {
            let load = self.registry.load_of(&self.node_of(&candidate)).await?;
            match &selected {
                Some((best, _, _)) if load >= *best => {}
                _ => selected = Some((load, candidate, value)),
            }
        }

        Ok(selected.map(|(_, candidate, value)| (candidate, value)))
    }

    /// The node a copy lives on, derived from its path; falls back to the
    /// recorded node for paths outside every configured root.
    pub(super) fn node_of(&self, chunk: &FileChunk) -> NodeId {
        self.registry
            .location_of(&chunk.path)
            .cloned()
            .unwrap_or_else(|| chunk.node.clone())
    }
}

/// Groups records that arrive sorted by index.
pub(super) fn group_by_index(chunks: Vec<FileChunk>) -> Vec<(u64, Vec<FileChunk>)> {
    let mut groups: Vec<(u64, Vec<FileChunk>)> = Vec::new();
    for chunk in chunks {
        match groups.last_mut() {
            Some((index, copies)) if *index == chunk.index => copies.push(chunk),
            _ => groups.push((chunk.index, vec![chunk])),
        }
    }
    groups
}

fn chunk_missing(file: &StoredFile, index: u64) -> StorageError {
    StorageError::ChunkMissing {
        file_id: file.id,
        file_name: file.name.clone(),
        index,
    }
}
