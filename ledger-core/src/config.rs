//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Single-writer configuration
    pub writer: WriterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "ledger-core".to_string(),
            rocksdb: RocksDBConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Single-writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,

    /// Upper bound for one request, queueing included (milliseconds)
    pub request_timeout_ms: u64,

    /// Commit retries on transient RocksDB statuses
    pub max_commit_retries: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            request_timeout_ms: 5_000,
            max_commit_retries: 3,
        }
    }
}

impl Config {
    /// Config rooted at `data_dir`, everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("LEDGER_REQUEST_TIMEOUT_MS") {
            config.writer.request_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_REQUEST_TIMEOUT_MS: {}", e)))?;
        }

        if let Ok(capacity) = std::env::var("LEDGER_MAILBOX_CAPACITY") {
            config.writer.mailbox_capacity = capacity
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_MAILBOX_CAPACITY: {}", e)))?;
        }

        if let Ok(sync) = std::env::var("LEDGER_SYNC_WRITES") {
            config.rocksdb.sync_writes = sync
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_SYNC_WRITES: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "ledger-core");
        assert_eq!(config.writer.request_timeout_ms, 5_000);
        assert!(config.rocksdb.sync_writes);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/tmp/bank"

            [writer]
            request_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/bank"));
        assert_eq!(config.writer.request_timeout_ms, 250);
        assert_eq!(config.writer.mailbox_capacity, 1024);
    }
}
