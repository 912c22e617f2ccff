use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::fs;

use crate::chunk::{ChunkConfig, DEFAULT_CHUNK_SIZE};
use crate::storage::RetryConfig;
use crate::{Node, Result, StorageError};

const DEFAULT_NODE_COUNT: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: String,
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub write_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    pub nodes: Vec<Node>,
}

fn default_chunk_size() -> String {
    DEFAULT_CHUNK_SIZE.to_string()
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Config {
    /// Three nodes under `<base>/nodes`, catalog at `<base>/catalog.json`.
    pub fn with_base_dir<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        let nodes = (1..=DEFAULT_NODE_COUNT)
            .map(|i| {
                let id = format!("node{}", i);
                let root = base.join("nodes").join(&id);
                Node::new(id, root)
            })
            .collect();

        Self {
            chunk_size: default_chunk_size(),
            catalog_path: base.join("catalog.json"),
            write_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            nodes,
        }
    }

    pub fn default_base_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("replistore"))
            .unwrap_or_else(|| PathBuf::from("./storage"))
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref()).await?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).map_err(|e| StorageError::Config(e.to_string()))?;
        config.chunk_config()?;
        Ok(config)
    }

    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(parse_size(&self.chunk_size)?)
    }

    pub fn retry_config(&self) -> Option<RetryConfig> {
        if self.write_retries == 0 {
            return None;
        }
        Some(RetryConfig::new(
            self.write_retries + 1,
            Duration::from_millis(self.retry_delay_ms),
        ))
    }
}

/// Parses sizes like `1MiB`, `4 KB` or `4096`. Decimal and binary suffixes
/// are both accepted.
pub fn parse_size(size_str: &str) -> Result<usize> {
    let size_str = size_str.trim().to_uppercase();
    const UNITS: [(&str, f64); 6] = [
        ("GIB", 1024.0 * 1024.0 * 1024.0),
        ("MIB", 1024.0 * 1024.0),
        ("KIB", 1024.0),
        ("GB", 1_000_000_000.0),
        ("MB", 1_000_000.0),
        ("KB", 1_000.0),
    ];

    for (suffix, factor) in UNITS {
        if let Some(stripped) = size_str.strip_suffix(suffix) {
            let num: f64 = stripped
                .trim()
                .parse()
                .map_err(|e: std::num::ParseFloatError| StorageError::Config(format!("bad size '{}': {}", size_str, e)))?;
            if !num.is_finite() || num < 0.0 {
                return Err(StorageError::Config(format!("bad size '{}'", size_str)));
            }
            return Ok((num * factor) as usize);
        }
    }

    // assume its given in bytes already
    size_str
        .strip_suffix('B')
        .unwrap_or(&size_str)
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| StorageError::Config(format!("bad size '{}': {}", size_str, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1GB").unwrap(), 1_000_000_000);
        assert_eq!(parse_size("500MB").unwrap(), 500_000_000);
        assert_eq!(parse_size("1MiB").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("4 kib").unwrap(), 4096);
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("16B").unwrap(), 16);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1MB").is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
            chunk_size = "4KiB"
            catalog_path = "/srv/replistore/catalog.json"
            write_retries = 2

            [[nodes]]
            id = "east"
            root = "/srv/replistore/east"

            [[nodes]]
            id = "west"
            root = "/srv/replistore/west"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_config().unwrap().chunk_size(), 4096);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].id.as_str(), "west");
        assert_eq!(config.retry_config().unwrap().max_retries(), 3);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let result = Config::from_toml(
            r#"
            chunk_size = "0"
            catalog_path = "catalog.json"
            nodes = []
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_base_dir_layout() {
        let config = Config::with_base_dir("/tmp/rs");
        assert_eq!(config.nodes.len(), 3);
        assert_eq!(config.nodes[0].root, PathBuf::from("/tmp/rs/nodes/node1"));
        assert_eq!(config.catalog_path, PathBuf::from("/tmp/rs/catalog.json"));
        assert_eq!(config.chunk_config().unwrap().chunk_size(), DEFAULT_CHUNK_SIZE);
        assert!(config.retry_config().is_none());
    }
}
