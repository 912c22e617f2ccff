use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Result;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

pub fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Incremental digest over data fed in pieces.
#[derive(Default)]
pub struct StreamingChecksum {
    hasher: Sha256,
    len: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.len)
    }
}

/// Hashes everything the reader yields, one buffer at a time.
///
/// Returns the hex digest together with the number of bytes consumed. The
/// reader is left at end of stream.
pub async fn checksum_reader<R>(reader: &mut R) -> Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut checksum = StreamingChecksum::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        checksum.update(&buffer[..read]);
    }

    Ok(checksum.finalize())
}
