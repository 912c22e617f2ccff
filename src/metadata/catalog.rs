use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{ChunkRole, FileChunk, FileId, FileState, NodeId, OwnerId, Result, StorageError, StoredFile};

/// In-memory tables behind [`JsonMetadataStore`](super::JsonMetadataStore).
///
/// Chunks are keyed by `(index, role)` per file so listing order falls out of
/// the map order and a duplicate `(file, index, role)` insert is rejected.
#[derive(Debug, Default)]
pub struct Catalog {
    files: HashMap<FileId, StoredFile>,
    by_checksum: HashMap<String, FileId>,
    chunks: HashMap<FileId, BTreeMap<(u64, ChunkRole), FileChunk>>,
}

/// On-disk form of the catalog.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Snapshot {
    files: Vec<StoredFile>,
    chunks: Vec<FileChunk>,
}

impl Catalog {
    pub fn create_file(
        &mut self,
        name: &str,
        owner: Option<&OwnerId>,
        size: u64,
        checksum: &str,
    ) -> Result<FileId> {
        if self.by_checksum.contains_key(checksum) {
            return Err(StorageError::ConstraintViolation(checksum.to_string()));
        }

        let id = FileId::new();
        let file = StoredFile {
            id,
            name: name.to_string(),
            owner: owner.cloned(),
            created_at: Utc::now(),
            size,
            checksum: checksum.to_string(),
            state: FileState::Pending,
        };
        self.by_checksum.insert(file.checksum.clone(), id);
        self.files.insert(id, file);
        self.chunks.insert(id, BTreeMap::new());
        Ok(id)
    }

    pub fn commit_file(&mut self, id: &FileId) -> Result<()> {
        let file = self
            .files
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        file.state = FileState::Committed;
        Ok(())
    }

    pub fn find_file_by_checksum(&self, checksum: &str) -> Option<StoredFile> {
        self.by_checksum
            .get(checksum)
            .and_then(|id| self.files.get(id))
            .cloned()
    }

    pub fn get_file(&self, id: &FileId) -> Option<StoredFile> {
        self.files.get(id).cloned()
    }

    pub fn list_files(&self) -> Vec<StoredFile> {
        let mut files: Vec<StoredFile> = self.files.values().cloned().collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        files
    }

    pub fn delete_file(&mut self, id: &FileId) -> Result<Vec<FileChunk>> {
        let file = self
            .files
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.by_checksum.remove(&file.checksum);
        Ok(self
            .chunks
            .remove(id)
            .map(|chunks| chunks.into_values().collect())
            .unwrap_or_default())
    }

    pub fn create_chunk(&mut self, chunk: FileChunk) -> Result<()> {
        let chunks = self
            .chunks
            .get_mut(&chunk.file_id)
            .ok_or_else(|| StorageError::NotFound(chunk.file_id.to_string()))?;

        let key = (chunk.index, chunk.role);
        if chunks.contains_key(&key) {
            return Err(StorageError::Metadata(format!(
                "{} copy of chunk {} for file {} already recorded",
                chunk.role, chunk.index, chunk.file_id
            )));
        }
        chunks.insert(key, chunk);
        Ok(())
    }

    /// Undoes a commit that could not be made durable.
    pub(super) fn revert_commit(&mut self, id: &FileId) {
        if let Some(file) = self.files.get_mut(id) {
            file.state = FileState::Pending;
        }
    }

    pub fn list_chunks(&self, file_id: &FileId) -> Vec<FileChunk> {
        self.chunks
            .get(file_id)
            .map(|chunks| chunks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_all_chunks(&self) -> Vec<FileChunk> {
        let mut all: Vec<FileChunk> = self.chunks.values().flat_map(|c| c.values().cloned()).collect();
        all.sort_by(|a, b| (a.file_id, a.index, a.role).cmp(&(b.file_id, b.index, b.role)));
        all
    }

    pub fn count_primary_chunks_by_node(&self, node: &NodeId) -> u64 {
        self.chunks
            .values()
            .flat_map(|c| c.values())
            .filter(|chunk| chunk.is_primary() && &chunk.node == node)
            .count() as u64
    }

    /// Chunk records of pending files are left out; recovery discards those
    /// files anyway.
    pub(super) fn to_snapshot(&self) -> Snapshot {
        let chunks = self
            .list_all_chunks()
            .into_iter()
            .filter(|chunk| {
                self.files
                    .get(&chunk.file_id)
                    .is_some_and(|file| file.is_committed())
            })
            .collect();
        Snapshot {
            files: self.list_files(),
            chunks,
        }
    }

    pub(super) fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut catalog = Catalog::default();
        for file in snapshot.files {
            if catalog.by_checksum.insert(file.checksum.clone(), file.id).is_some() {
                return Err(StorageError::Metadata(format!(
                    "checksum {} appears on more than one file",
                    file.checksum
                )));
            }
            catalog.chunks.insert(file.id, BTreeMap::new());
            catalog.files.insert(file.id, file);
        }
        for chunk in snapshot.chunks {
            catalog.create_chunk(chunk)?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(file_id: FileId, index: u64, node: &str, role: ChunkRole) -> FileChunk {
        FileChunk {
            file_id,
            index,
            node: NodeId::new(node),
            path: PathBuf::from(format!("/{}/{}_{}", node, file_id, index)),
            checksum: "c".repeat(64),
            role,
        }
    }

    #[test]
    fn test_checksum_is_unique() {
        let mut catalog = Catalog::default();
        catalog.create_file("a.txt", None, 3, "abc").unwrap();

        let err = catalog.create_file("b.txt", None, 3, "abc").unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn test_new_files_are_pending_until_committed() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        assert_eq!(catalog.get_file(&id).unwrap().state, FileState::Pending);

        catalog.commit_file(&id).unwrap();
        assert!(catalog.get_file(&id).unwrap().is_committed());
    }

    #[test]
    fn test_chunks_listed_by_index_then_role() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        catalog.create_chunk(chunk(id, 1, "node2", ChunkRole::Replica)).unwrap();
        catalog.create_chunk(chunk(id, 0, "node2", ChunkRole::Replica)).unwrap();
        catalog.create_chunk(chunk(id, 1, "node1", ChunkRole::Primary)).unwrap();
        catalog.create_chunk(chunk(id, 0, "node1", ChunkRole::Primary)).unwrap();

        let order: Vec<(u64, ChunkRole)> = catalog.list_chunks(&id).iter().map(|c| (c.index, c.role)).collect();
        assert_eq!(
            order,
            vec![
                (0, ChunkRole::Primary),
                (0, ChunkRole::Replica),
                (1, ChunkRole::Primary),
                (1, ChunkRole::Replica),
            ]
        );
    }

    #[test]
    fn test_duplicate_chunk_role_rejected() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        catalog.create_chunk(chunk(id, 0, "node1", ChunkRole::Primary)).unwrap();
        assert!(catalog.create_chunk(chunk(id, 0, "node3", ChunkRole::Primary)).is_err());
    }

    #[test]
    fn test_chunk_for_unknown_file_rejected() {
        let mut catalog = Catalog::default();
        let err = catalog.create_chunk(chunk(FileId::new(), 0, "node1", ChunkRole::Primary)).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_delete_file_cascades_and_frees_checksum() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        catalog.create_chunk(chunk(id, 0, "node1", ChunkRole::Primary)).unwrap();
        catalog.create_chunk(chunk(id, 0, "node2", ChunkRole::Replica)).unwrap();

        let removed = catalog.delete_file(&id).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(catalog.list_chunks(&id).is_empty());
        assert!(catalog.find_file_by_checksum("abc").is_none());
        assert!(catalog.create_file("again.txt", None, 3, "abc").is_ok());
    }

    #[test]
    fn test_primary_count_ignores_replicas() {
        let mut catalog = Catalog::default();
        let a = catalog.create_file("a.txt", None, 3, "aaa").unwrap();
        let b = catalog.create_file("b.txt", None, 3, "bbb").unwrap();
        catalog.create_chunk(chunk(a, 0, "node1", ChunkRole::Primary)).unwrap();
        catalog.create_chunk(chunk(a, 0, "node2", ChunkRole::Replica)).unwrap();
        catalog.create_chunk(chunk(b, 0, "node1", ChunkRole::Primary)).unwrap();
        catalog.create_chunk(chunk(b, 0, "node2", ChunkRole::Replica)).unwrap();

        assert_eq!(catalog.count_primary_chunks_by_node(&NodeId::new("node1")), 2);
        assert_eq!(catalog.count_primary_chunks_by_node(&NodeId::new("node2")), 0);
        assert_eq!(catalog.count_primary_chunks_by_node(&NodeId::new("node3")), 0);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_indexes() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        catalog.create_chunk(chunk(id, 0, "node1", ChunkRole::Primary)).unwrap();
        catalog.commit_file(&id).unwrap();

        let json = serde_json::to_string(&catalog.to_snapshot()).unwrap();
        let restored = Catalog::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.find_file_by_checksum("abc").unwrap().id, id);
        assert_eq!(restored.list_chunks(&id).len(), 1);
    }

    #[test]
    fn test_snapshot_skips_chunks_of_pending_files() {
        let mut catalog = Catalog::default();
        let id = catalog.create_file("a.txt", None, 3, "abc").unwrap();
        catalog.create_chunk(chunk(id, 0, "node1", ChunkRole::Primary)).unwrap();

        let snapshot = catalog.to_snapshot();
        assert_eq!(snapshot.files.len(), 1);
        assert!(snapshot.chunks.is_empty());
    }
}
