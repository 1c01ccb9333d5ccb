//! Stable event names attached to pipeline log lines as the `event` field.

// Ingress
pub const RECORD_DROPPED: &str = "metrics.record_dropped";

// Worker lifecycle
pub const WORKER_STARTED: &str = "metrics.worker_started";
pub const WORKER_STOPPING: &str = "metrics.worker_stopping";
pub const WORKER_STOPPED: &str = "metrics.worker_stopped";

// Flush
pub const BATCH_FLUSHING: &str = "metrics.batch_flushing";
pub const BATCH_FLUSHED: &str = "metrics.batch_flushed";
pub const BATCH_FAILED: &str = "metrics.batch_failed";
pub const BATCH_TIMED_OUT: &str = "metrics.batch_timed_out";

// Sink
pub const SINK_WARMUP: &str = "sink.warmup";
pub const SINK_SCHEMA: &str = "sink.schema";
