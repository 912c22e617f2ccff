use thiserror::Error;

use crate::FileId;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Missing or corrupted chunk #{index}. Cannot reconstruct file '{file_name}' ({file_id})")]
    ChunkMissing {
        file_id: FileId,
        file_name: String,
        index: u64,
    },
    #[error("A file with checksum {0} already exists")]
    ConstraintViolation(String),
    #[error("File {0} has not finished uploading")]
    Incomplete(FileId),
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Metadata(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
