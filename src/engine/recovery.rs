use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::warn;

use super::rollback::undo;
use super::ReplicaStore;
use crate::{FileId, Result};

impl ReplicaStore {
    /// Discards uploads a previous run left unfinished: their records and any
    /// copy written under their id on a configured node, including `.partial`
    /// leftovers. Must run before any upload starts.
    pub(super) async fn recover(&self) -> Result<usize> {
        let unfinished: Vec<FileId> = self
            .metadata
            .list_files()
            .await?
            .into_iter()
            .filter(|file| !file.is_committed())
            .map(|file| file.id)
            .collect();

        for file_id in &unfinished {
            let mut written: Vec<PathBuf> = self
                .metadata
                .list_chunks(file_id)
                .await?
                .into_iter()
                .map(|chunk| chunk.path)
                .collect();
            for node in self.registry.nodes() {
                written.extend(copies_under(&node.root, file_id).await?);
            }
            written.sort();
            written.dedup();

            warn!("Discarding unfinished upload {} ({} copies on disk)", file_id, written.len());
            undo(Arc::clone(&self.metadata), Arc::clone(&self.chunks), *file_id, written).await;
        }

        Ok(unfinished.len())
    }
}

/// Chunk files named for `file_id` directly under a node root.
async fn copies_under(root: &Path, file_id: &FileId) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}_chunk_", file_id);
    let mut found = Vec::new();
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            found.push(entry.path());
        }
    }
    Ok(found)
}
