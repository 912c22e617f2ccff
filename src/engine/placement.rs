use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::rollback::Rollback;
use super::ReplicaStore;
use crate::chunk::{calculate_checksum, checksum_reader, ChunkSplitter, StreamingChecksum};
use crate::{ChunkRole, FileChunk, FileId, Node, OwnerId, Result, StorageError, StoreOutcome};

/// How often a lost create race is re-resolved before giving up.
const RESERVE_ATTEMPTS: usize = 3;

/// Longest wait before an in-flight upload of the same content is looked up
/// again.
const PENDING_RECHECK: Duration = Duration::from_millis(100);

impl ReplicaStore {
    /// Stores the content of `reader` under `file_name`.
    ///
    /// The stream is read twice: once for the whole-file checksum that keys
    /// deduplication, then again, after rewinding, to split and place chunks.
    /// Content already stored byte-for-byte returns
    /// [`StoreOutcome::Duplicate`] with the existing id and writes nothing.
    /// While another upload of the same content is still in progress this
    /// waits for it: a commit makes this call a duplicate, a rollback lets it
    /// store the content itself.
    ///
    /// On any failure every copy written so far and the file's records are
    /// removed before the error is returned.
    pub async fn store<R>(&self, file_name: &str, owner: Option<&OwnerId>, mut reader: R) -> Result<StoreOutcome>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let (checksum, size) = checksum_reader(&mut reader).await?;
        reader.seek(SeekFrom::Start(0)).await?;

        let file_id = match self.reserve(file_name, owner, size, &checksum).await? {
            StoreOutcome::Stored(id) => id,
            duplicate @ StoreOutcome::Duplicate(_) => {
                info!(
                    "Upload of '{}' matches stored file {}; skipping chunk writes",
                    file_name,
                    duplicate.file_id()
                );
                return Ok(duplicate);
            }
        };

        let mut rollback = Rollback::new(
            Arc::clone(&self.metadata),
            Arc::clone(&self.chunks),
            Arc::clone(&self.settled),
            file_id,
        );
        match self.place_chunks(file_id, &checksum, size, reader, &mut rollback).await {
            Ok(chunk_count) => {
                rollback.disarm();
                self.settled.notify_waiters();
                info!(
                    "Stored '{}' as {} ({} bytes, {} chunks)",
                    file_name, file_id, size, chunk_count
                );
                Ok(StoreOutcome::Stored(file_id))
            }
            Err(e) => {
                warn!("Storing '{}' failed, rolling back {}: {}", file_name, file_id, e);
                rollback.run().await;
                Err(e)
            }
        }
    }

    /// Claims the checksum for a new file, or reports the committed file that
    /// already holds it.
    async fn reserve(
        &self,
        file_name: &str,
        owner: Option<&OwnerId>,
        size: u64,
        checksum: &str,
    ) -> Result<StoreOutcome> {
        let mut lost_races = 0;
        loop {
            // Registered before the lookup so a settle in between still wakes us.
            let settled = self.settled.notified();
            match self.metadata.find_file_by_checksum(checksum).await? {
                Some(existing) if existing.is_committed() => {
                    return Ok(StoreOutcome::Duplicate(existing.id));
                }
                Some(existing) => {
                    debug!("Waiting for in-flight upload {} of the same content", existing.id);
                    let _ = timeout(PENDING_RECHECK, settled).await;
                    continue;
                }
                None => {}
            }

            match self.metadata.create_file(file_name, owner, size, checksum).await {
                Ok(id) => return Ok(StoreOutcome::Stored(id)),
                // Another upload of the same bytes got there first.
                Err(StorageError::ConstraintViolation(_)) => {
                    lost_races += 1;
                    if lost_races >= RESERVE_ATTEMPTS {
                        return Err(StorageError::ConstraintViolation(checksum.to_string()));
                    }
                    debug!("Lost create race for checksum {}", checksum);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn place_chunks<R>(
        &self,
        file_id: FileId,
        checksum: &str,
        size: u64,
        reader: R,
        rollback: &mut Rollback,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut splitter = ChunkSplitter::new(reader, self.chunk_config);
        let mut rotation = self.registry.rotation(0);
        let mut placed = StreamingChecksum::new();
        let mut index = 0u64;

        while let Some(block) = splitter.next_chunk().await? {
            placed.update(&block);
            let chunk_checksum = calculate_checksum(&block);
            let (primary, replica) = rotation.next_pair();
            debug!(
                "chunk {} of {}: primary {}, replica {}",
                index, file_id, primary.id, replica.id
            );

            self.write_copy(file_id, index, primary, ChunkRole::Primary, &block, &chunk_checksum, rollback)
                .await?;
            self.write_copy(file_id, index, replica, ChunkRole::Replica, &block, &chunk_checksum, rollback)
                .await?;
            index += 1;
        }

        // The source must not change between the checksum pass and this one.
        let (placed_checksum, placed_size) = placed.finalize();
        if placed_checksum != checksum || placed_size != size {
            return Err(StorageError::Storage(format!(
                "source changed during upload: expected {} bytes ({}), read {} bytes ({})",
                size, checksum, placed_size, placed_checksum
            )));
        }

        self.metadata.commit_file(&file_id).await?;
        Ok(index)
    }

    /// Writes one copy, then records it. The record only exists once the
    /// bytes are on disk.
    #[allow(clippy::too_many_arguments)]
    async fn write_copy(
        &self,
        file_id: FileId,
        index: u64,
        node: &Node,
        role: ChunkRole,
        block: &[u8],
        checksum: &str,
        rollback: &mut Rollback,
    ) -> Result<()> {
        let path = Self::chunk_path(node, &file_id, index, role);
        rollback.track(path.clone());
        self.chunks.write(&path, block).await?;

        self.metadata
            .create_chunk(FileChunk {
                file_id,
                index,
                node: node.id.clone(),
                path,
                checksum: checksum.to_string(),
                role,
            })
            .await
    }
}
