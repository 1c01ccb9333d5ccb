//! Portal metrics common types.
//!
//! This crate provides foundational types shared across the pipeline crates:
//! - The immutable `MetricRecord` observation
//! - Service configuration loading, resolution, and validation

pub mod config;
pub mod record;

pub use config::{
    BatcherConfig, Compression, ConfigError, ConfigSource, ResolvedConfig, ServiceConfig,
    SinkConfig,
};
pub use record::{MetricRecord, RecordError};
