use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::warn;

use crate::metadata::MetadataStore;
use crate::storage::ChunkStore;
use crate::{FileId, StorageError};

/// Undoes a partially completed upload.
///
/// Tracks every physical path an upload has started writing. Unless
/// [`disarm`](Rollback::disarm)ed, the written bytes and the file's metadata
/// (chunk records cascade with it) are removed, either explicitly through
/// [`run`](Rollback::run) or, if the upload future is dropped, from a task
/// spawned on the current runtime.
pub(super) struct Rollback {
    metadata: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    settled: Arc<Notify>,
    file_id: FileId,
    written: Vec<PathBuf>,
    armed: bool,
}

impl Rollback {
    pub(super) fn new(
        metadata: Arc<dyn MetadataStore>,
        chunks: Arc<dyn ChunkStore>,
        settled: Arc<Notify>,
        file_id: FileId,
    ) -> Self {
        Self {
            metadata,
            chunks,
            settled,
            file_id,
            written: Vec::new(),
            armed: true,
        }
    }

    /// Call before the write starts; a failed write may still leave bytes.
    pub(super) fn track(&mut self, path: PathBuf) {
        self.written.push(path);
    }

    pub(super) fn disarm(mut self) {
        self.armed = false;
    }

    pub(super) async fn run(mut self) {
        self.armed = false;
        let written = mem::take(&mut self.written);
        undo(Arc::clone(&self.metadata), Arc::clone(&self.chunks), self.file_id, written).await;
        self.settled.notify_waiters();
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let metadata = Arc::clone(&self.metadata);
        let chunks = Arc::clone(&self.chunks);
        let file_id = self.file_id;
        let settled = Arc::clone(&self.settled);
        let written = mem::take(&mut self.written);
        match Handle::try_current() {
            Ok(handle) => {
                warn!("Upload of {} was cancelled; cleaning up", file_id);
                handle.spawn(async move {
                    undo(metadata, chunks, file_id, written).await;
                    settled.notify_waiters();
                });
            }
            Err(_) => warn!(
                "Upload of {} was cancelled outside a runtime; {} chunk copies left behind",
                file_id,
                written.len()
            ),
        }
    }
}

pub(super) async fn undo(
    metadata: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    file_id: FileId,
    written: Vec<PathBuf>,
) {
    // Records first, so nothing points at bytes that are about to vanish.
    match metadata.delete_file(&file_id).await {
        Ok(_) | Err(StorageError::NotFound(_)) => {}
        Err(e) => warn!("Rollback could not remove metadata for {}: {}", file_id, e),
    }

    for path in written {
        if let Err(e) = chunks.delete(&path).await {
            warn!("Rollback could not remove {}: {}", path.display(), e);
        }
    }
}
