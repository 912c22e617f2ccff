pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod registry;
pub mod storage;

mod types;

pub use config::Config;
pub use engine::ReplicaStore;
pub use error::{Result, StorageError};
pub use types::*;
