//! Portal metrics batching pipeline.
//!
//! This crate provides:
//! - Bounded, non-blocking ingress for metric records
//! - A single-owner batch worker with size and interval flush triggers
//! - Fire-and-forget bulk writes to a storage sink with a deadline
//! - Postgres, Parquet, and in-memory sinks
//! - Pipeline counters for drops, flushes, and failures

pub mod batcher;
pub mod events;
pub mod schema;
pub mod sink;
pub mod stats;

pub use batcher::{channel, BatchWorker, BatcherHandle, FlushReason, MetricsBatcher};
pub use schema::{network_metrics_schema, records_from_batch, records_to_batch};
pub use sink::memory::MemorySink;
pub use sink::parquet::{ParquetSink, ParquetSinkConfig};
pub use sink::postgres::PostgresSink;
pub use sink::{build_sink, MetricSink, SinkError, SinkResult};
pub use stats::{BatcherStats, StatsSnapshot};

/// Destination table (and Parquet directory) for metric rows.
pub const NETWORK_METRICS_TABLE: &str = "network_metrics";
