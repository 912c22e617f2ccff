mod chunk;
mod file;
mod node;

pub use chunk::{ChunkRole, FileChunk};
pub use file::{FileId, FileState, OwnerId, StoreOutcome, StoredFile};
pub use node::{Node, NodeId};
