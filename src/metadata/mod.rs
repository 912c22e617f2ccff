//! Durable records of stored files and their chunk copies.

use async_trait::async_trait;

use crate::{FileChunk, FileId, NodeId, OwnerId, Result, StoredFile};

mod catalog;
mod json;

pub use catalog::Catalog;
pub use json::JsonMetadataStore;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Records a new file in the [`Pending`](crate::FileState::Pending) state.
    ///
    /// Fails with [`ConstraintViolation`](crate::StorageError::ConstraintViolation)
    /// when a file with the same whole-file checksum already exists. The check
    /// and the insert happen atomically.
    async fn create_file(
        &self,
        name: &str,
        owner: Option<&OwnerId>,
        size: u64,
        checksum: &str,
    ) -> Result<FileId>;

    /// Marks a pending file as fully written.
    async fn commit_file(&self, id: &FileId) -> Result<()>;

    async fn find_file_by_checksum(&self, checksum: &str) -> Result<Option<StoredFile>>;

    async fn get_file(&self, id: &FileId) -> Result<Option<StoredFile>>;

    /// All files, newest first.
    async fn list_files(&self) -> Result<Vec<StoredFile>>;

    /// Removes the file and every chunk record it owns, returning those chunks.
    async fn delete_file(&self, id: &FileId) -> Result<Vec<FileChunk>>;

    async fn create_chunk(&self, chunk: FileChunk) -> Result<()>;

    /// Chunks of one file ordered by index, primary before replica.
    async fn list_chunks(&self, file_id: &FileId) -> Result<Vec<FileChunk>>;

    async fn list_all_chunks(&self) -> Result<Vec<FileChunk>>;

    async fn count_primary_chunks_by_node(&self, node: &NodeId) -> Result<u64>;
}
