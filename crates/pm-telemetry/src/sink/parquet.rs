//! Parquet sink for metric batches.
//!
//! Each flushed batch becomes one compressed Parquet file, written to a temp
//! path and renamed into place so readers never observe a partial file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use async_trait::async_trait;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, Encoding, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use pm_common::{MetricRecord, SinkConfig};
use uuid::Uuid;

use super::{MetricSink, SinkError, SinkResult};
use crate::schema::{network_metrics_schema, records_to_batch};
use crate::NETWORK_METRICS_TABLE;

/// Configuration for the Parquet sink.
#[derive(Debug, Clone)]
pub struct ParquetSinkConfig {
    /// Directory for telemetry files.
    pub base_dir: PathBuf,

    /// Compression codec.
    pub compression: Compression,

    /// Maximum rows per row group.
    pub row_group_size: usize,

    /// Host ID for partitioning.
    pub host_id: String,
}

impl ParquetSinkConfig {
    /// Create config with defaults.
    pub fn new(base_dir: PathBuf, host_id: String) -> Self {
        ParquetSinkConfig {
            base_dir,
            compression: Compression::ZSTD(ZstdLevel::default()),
            row_group_size: 64 * 1024,
            host_id,
        }
    }

    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    /// Set custom row group size.
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Translate the service-level sink settings.
    pub fn from_sink_config(config: &SinkConfig) -> SinkResult<Self> {
        let SinkConfig::Parquet {
            base_dir,
            compression,
            row_group_size,
            host_id,
        } = config
        else {
            return Err(SinkError::InvalidInput {
                message: format!("expected a parquet sink config, got '{}'", config.kind()),
            });
        };

        let base_dir = base_dir.clone().unwrap_or_else(default_telemetry_dir);
        let host_id = host_id.clone().unwrap_or_else(default_host_id);
        let out = ParquetSinkConfig::new(base_dir, host_id).with_row_group_size(*row_group_size);
        Ok(match compression {
            pm_common::Compression::Zstd => out,
            pm_common::Compression::Snappy => out.with_snappy(),
            pm_common::Compression::None => ParquetSinkConfig {
                compression: Compression::UNCOMPRESSED,
                ..out
            },
        })
    }
}

/// Writes every batch to its own partitioned Parquet file.
pub struct ParquetSink {
    config: ParquetSinkConfig,
    schema: Arc<Schema>,
}

impl ParquetSink {
    pub fn new(config: ParquetSinkConfig) -> Self {
        ParquetSink {
            config,
            schema: Arc::new(network_metrics_schema()),
        }
    }

    pub fn config(&self) -> &ParquetSinkConfig {
        &self.config
    }

    /// Build the output path for a batch, partitioned by write date and host.
    ///
    /// Layout: `<base>/network_metrics/year=YYYY/month=MM/day=DD/host_id=<id>/network_metrics_<batch>.parquet`
    pub fn build_output_path(&self, batch_id: &Uuid) -> PathBuf {
        let now = chrono::Utc::now();

        self.config
            .base_dir
            .join(NETWORK_METRICS_TABLE)
            .join(format!("year={}", now.format("%Y")))
            .join(format!("month={}", now.format("%m")))
            .join(format!("day={}", now.format("%d")))
            .join(format!("host_id={}", &self.config.host_id))
            .join(format!(
                "{}_{}.parquet",
                NETWORK_METRICS_TABLE,
                batch_id.simple()
            ))
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_size)
            // Dictionary encoding for the device_id column
            .set_dictionary_enabled(true)
            .set_encoding(Encoding::PLAIN)
            .build()
    }
}

/// Write one record batch to `output_path` via a temp file.
///
/// On any failure after the temp file is created it is removed again, so a
/// failed flush leaves nothing behind in the partition directory.
fn write_file(
    output_path: &Path,
    schema: Arc<Schema>,
    batch: &RecordBatch,
    props: WriterProperties,
) -> SinkResult<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = output_path.with_extension("parquet.tmp");
    let file = File::create(&temp_path)?;
    let result = write_and_publish(file, &temp_path, output_path, schema, batch, props);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_publish(
    file: File,
    temp_path: &Path,
    output_path: &Path,
    schema: Arc<Schema>,
    batch: &RecordBatch,
    props: WriterProperties,
) -> SinkResult<()> {
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    fs::rename(temp_path, output_path)?;
    Ok(())
}

/// Get the telemetry base directory from XDG data dir.
pub fn default_telemetry_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("portal-metrics")
        .join("telemetry")
}

/// Host partition key when none is configured.
fn default_host_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or_else(|| "local".to_string())
}

#[async_trait]
impl MetricSink for ParquetSink {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn write_batch(&self, batch: &[MetricRecord]) -> SinkResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let record_batch = records_to_batch(batch)?;
        let output_path = self.build_output_path(&Uuid::new_v4());
        let schema = self.schema.clone();
        let props = self.writer_properties();
        let rows = record_batch.num_rows() as u64;

        tokio::task::spawn_blocking(move || {
            write_file(&output_path, schema, &record_batch, props)?;
            tracing::debug!(path = %output_path.display(), rows, "Wrote metrics parquet file");
            Ok::<_, SinkError>(())
        })
        .await
        .map_err(|e| SinkError::Task {
            message: e.to_string(),
        })??;

        Ok(rows)
    }
}
