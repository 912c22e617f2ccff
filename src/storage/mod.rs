pub mod disk;
pub mod retry;

pub use disk::{ChunkStore, DiskChunkStore};
pub use retry::{with_retry, RetryConfig};
