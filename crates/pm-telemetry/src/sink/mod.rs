//! Storage sinks for flushed metric batches.
//!
//! A sink receives one frozen batch per flush and performs a single bulk
//! write. Sinks never retry; the batch worker logs the outcome and moves on.

pub mod memory;
pub mod parquet;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pm_common::{MetricRecord, SinkConfig};
use thiserror::Error;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors from sink writes and setup.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Database connection error.
    #[error("database connection error: {message}")]
    Connection { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    Query { message: String },

    #[error("operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Background write task panicked or was cancelled.
    #[error("write task failed: {message}")]
    Task { message: String },
}

/// Bulk-insert destination for metric batches.
///
/// Implementations must be thread-safe; several writes may be in flight at once
/// and may complete in any order.
#[async_trait]
pub trait MetricSink: Send + Sync + 'static {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Write the whole batch in one bulk operation, returning rows written.
    async fn write_batch(&self, batch: &[MetricRecord]) -> SinkResult<u64>;
}

/// Build the sink described by `config`.
///
/// Postgres pools connect lazily, so this never touches the network.
pub fn build_sink(config: &SinkConfig) -> SinkResult<Arc<dyn MetricSink>> {
    match config {
        SinkConfig::Postgres { .. } => Ok(Arc::new(postgres::PostgresSink::connect_lazy(config)?)),
        SinkConfig::Parquet { .. } => Ok(Arc::new(parquet::ParquetSink::new(
            parquet::ParquetSinkConfig::from_sink_config(config)?,
        ))),
        SinkConfig::Memory => Ok(Arc::new(memory::MemorySink::new())),
    }
}
