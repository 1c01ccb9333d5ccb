//! Service configuration for the metrics pipeline.
//!
//! This module provides:
//! - Typed batcher and sink settings with the production defaults
//! - TOML loading with environment overrides
//! - Semantic validation with stable error codes
//! - Deterministic config file resolution (CLI > env > XDG > defaults)

pub mod resolve;

pub use resolve::{resolve_config_path, ConfigSource, ResolvedConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default ingress queue capacity (pending records).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of records that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default flush interval in seconds.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 10;

/// Default deadline for a single bulk write in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 15;

/// Default destination table for metric rows.
pub const DEFAULT_TABLE: &str = "network_metrics";

/// Environment variable that overrides the Postgres connection URL.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io { .. } => 60,
            ConfigError::Parse { .. } => 61,
            ConfigError::InvalidValue { .. } => 65,
            ConfigError::MissingField(_) => 64,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Batching behaviour: queue bound, size trigger, time trigger, write deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Maximum records waiting in the ingress queue before adds are dropped.
    pub queue_capacity: usize,
    /// Accumulated records that trigger an immediate flush.
    pub batch_size: usize,
    /// Interval between timer-driven flushes (seconds).
    pub flush_interval_secs: u64,
    /// Deadline for a single bulk write (seconds).
    pub write_timeout_secs: u64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        BatcherConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
        }
    }
}

impl BatcherConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    pub fn with_write_timeout_secs(mut self, secs: u64) -> Self {
        self.write_timeout_secs = secs;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Check the settings are usable by the batch worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "batcher.queue_capacity",
                "must be at least 1",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batcher.batch_size", "must be at least 1"));
        }
        if self.batch_size > self.queue_capacity {
            return Err(ConfigError::invalid(
                "batcher.batch_size",
                format!(
                    "{} exceeds queue_capacity {}",
                    self.batch_size, self.queue_capacity
                ),
            ));
        }
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "batcher.flush_interval_secs",
                "must be at least 1",
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "batcher.write_timeout_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Zstd,
    Snappy,
    None,
}

/// Where flushed batches are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Bulk insert into a Postgres table.
    Postgres {
        #[serde(default)]
        database_url: String,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        #[serde(default)]
        min_connections: u32,
        #[serde(default = "default_idle_timeout_secs")]
        idle_timeout_secs: u64,
        #[serde(default = "default_max_lifetime_secs")]
        max_lifetime_secs: u64,
        #[serde(default = "default_connect_timeout_secs")]
        connect_timeout_secs: u64,
    },
    /// One Parquet file per flushed batch.
    Parquet {
        #[serde(default)]
        base_dir: Option<PathBuf>,
        #[serde(default)]
        compression: Compression,
        #[serde(default = "default_row_group_size")]
        row_group_size: usize,
        #[serde(default)]
        host_id: Option<String>,
    },
    /// Keep batches in process memory.
    Memory,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_max_connections() -> u32 {
    15
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_max_lifetime_secs() -> u64 {
    5 * 60
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_row_group_size() -> usize {
    64 * 1024
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::postgres("")
    }
}

impl SinkConfig {
    /// Postgres sink with the pool defaults used in production.
    pub fn postgres(database_url: impl Into<String>) -> Self {
        SinkConfig::Postgres {
            database_url: database_url.into(),
            table: default_table(),
            max_connections: default_max_connections(),
            min_connections: 0,
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Parquet sink rooted at `base_dir` (or the XDG data dir when `None`).
    pub fn parquet(base_dir: Option<PathBuf>) -> Self {
        SinkConfig::Parquet {
            base_dir,
            compression: Compression::default(),
            row_group_size: default_row_group_size(),
            host_id: None,
        }
    }

    /// Short name for logs and CLI selection.
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Postgres { .. } => "postgres",
            SinkConfig::Parquet { .. } => "parquet",
            SinkConfig::Memory => "memory",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SinkConfig::Postgres {
                database_url,
                table,
                max_connections,
                min_connections,
                ..
            } => {
                if database_url.trim().is_empty() {
                    return Err(ConfigError::MissingField(format!(
                        "sink.database_url (or {} env var)",
                        ENV_DATABASE_URL
                    )));
                }
                if !is_valid_identifier(table) {
                    return Err(ConfigError::invalid(
                        "sink.table",
                        format!("'{}' is not a plain SQL identifier", table),
                    ));
                }
                if *max_connections == 0 || min_connections > max_connections {
                    return Err(ConfigError::invalid(
                        "sink.max_connections",
                        format!(
                            "need 0 <= min ({}) <= max ({}) and max >= 1",
                            min_connections, max_connections
                        ),
                    ));
                }
                Ok(())
            }
            SinkConfig::Parquet { row_group_size, .. } => {
                if *row_group_size == 0 {
                    return Err(ConfigError::invalid(
                        "sink.row_group_size",
                        "must be at least 1",
                    ));
                }
                Ok(())
            }
            SinkConfig::Memory => Ok(()),
        }
    }
}

/// Table names are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub batcher: BatcherConfig,
    pub sink: SinkConfig,
}

impl ServiceConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Apply environment overrides (`DATABASE_URL`).
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.apply_database_url(url);
        }
        self
    }

    fn apply_database_url(&mut self, url: String) {
        if url.trim().is_empty() {
            return;
        }
        if let SinkConfig::Postgres { database_url, .. } = &mut self.sink {
            *database_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batcher.validate()?;
        self.sink.validate()
    }
}
