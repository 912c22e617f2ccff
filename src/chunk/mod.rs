use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Result, StorageError};

pub mod checksum;

pub use checksum::{calculate_checksum, checksum_reader, StreamingChecksum, DIGEST_HEX_LEN};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StorageError::Config("chunk size must be at least 1 byte".to_string()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Splits a byte stream into fixed-size blocks on demand.
///
/// Every block is exactly `chunk_size` bytes except the last, which holds the
/// remainder. An empty stream yields no blocks. The underlying reader is
/// consumed; rewind it yourself if the bytes are needed again.
pub struct ChunkSplitter<R> {
    reader: R,
    chunk_size: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkSplitter<R> {
    pub fn new(reader: R, config: ChunkConfig) -> Self {
        Self {
            reader,
            chunk_size: config.chunk_size(),
            finished: false,
        }
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let mut block = vec![0u8; self.chunk_size];
        let mut filled = 0;

        // Short reads are normal for files and sockets alike; keep going
        // until the block is full or the stream ends.
        while filled < self.chunk_size {
            let read = self.reader.read(&mut block[filled..]).await?;
            if read == 0 {
                self.finished = true;
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }
        block.truncate(filled);
        Ok(Some(block))
    }
}
