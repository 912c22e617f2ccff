use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{FileId, NodeId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkRole {
    Primary,
    Replica,
}

impl fmt::Display for ChunkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkRole::Primary => f.write_str("primary"),
            ChunkRole::Replica => f.write_str("replica"),
        }
    }
}

/// One physical copy of one logical chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChunk {
    pub file_id: FileId,
    pub index: u64,
    pub node: NodeId,
    pub path: PathBuf,
    pub checksum: String,
    pub role: ChunkRole,
}

impl FileChunk {
    pub fn is_primary(&self) -> bool {
        self.role == ChunkRole::Primary
    }
}
