//! Arrow schema for the `network_metrics` table and record conversion.
//!
//! Measurement columns are nullable so that an unmeasured sample is stored as
//! NULL rather than as a zero.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Float64Type, Schema, TimeUnit, TimestampMicrosecondType};
use arrow::error::ArrowError;
use chrono::DateTime;
use pm_common::MetricRecord;

/// Column names in write order.
pub const COLUMNS: [&str; 6] = [
    "device_id",
    "latency",
    "loss",
    "bandwidth",
    "is_down",
    "timestamp",
];

/// Helper to create a timestamp field (microseconds UTC).
fn timestamp_field(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        nullable,
    )
}

/// Schema for `network_metrics`: one row per device observation.
pub fn network_metrics_schema() -> Schema {
    Schema::new(vec![
        Field::new(COLUMNS[0], DataType::Utf8, false),
        Field::new(COLUMNS[1], DataType::Float64, true),
        Field::new(COLUMNS[2], DataType::Float64, true),
        Field::new(COLUMNS[3], DataType::Float64, true),
        Field::new(COLUMNS[4], DataType::Boolean, true),
        timestamp_field(COLUMNS[5], false),
    ])
}

/// Convert a batch of records into a single Arrow record batch, preserving order.
pub fn records_to_batch(records: &[MetricRecord]) -> Result<RecordBatch, ArrowError> {
    let device_id = StringArray::from(
        records
            .iter()
            .map(|r| r.subject_id())
            .collect::<Vec<_>>(),
    );
    let latency = Float64Array::from(records.iter().map(|r| r.latency()).collect::<Vec<_>>());
    let loss = Float64Array::from(records.iter().map(|r| r.loss()).collect::<Vec<_>>());
    let bandwidth =
        Float64Array::from(records.iter().map(|r| r.bandwidth()).collect::<Vec<_>>());
    let is_down = BooleanArray::from(records.iter().map(|r| r.is_down()).collect::<Vec<_>>());
    let timestamp = TimestampMicrosecondArray::from(
        records
            .iter()
            .map(|r| r.timestamp().timestamp_micros())
            .collect::<Vec<_>>(),
    )
    .with_timezone("UTC");

    let columns: Vec<ArrayRef> = vec![
        Arc::new(device_id),
        Arc::new(latency),
        Arc::new(loss),
        Arc::new(bandwidth),
        Arc::new(is_down),
        Arc::new(timestamp),
    ];
    RecordBatch::try_new(Arc::new(network_metrics_schema()), columns)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, ArrowError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("missing column '{}'", name)))
}

fn type_error(name: &str) -> ArrowError {
    ArrowError::SchemaError(format!("column '{}' has an unexpected type", name))
}

fn float_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a arrow::array::PrimitiveArray<Float64Type>, ArrowError> {
    column(batch, name)?
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| type_error(name))
}

fn optional_f64(array: &Float64Array, row: usize) -> Option<f64> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row))
    }
}

/// Decode an Arrow record batch written with [`network_metrics_schema`].
pub fn records_from_batch(batch: &RecordBatch) -> Result<Vec<MetricRecord>, ArrowError> {
    let device_id = column(batch, COLUMNS[0])?
        .as_string_opt::<i32>()
        .ok_or_else(|| type_error(COLUMNS[0]))?;
    let latency = float_column(batch, COLUMNS[1])?;
    let loss = float_column(batch, COLUMNS[2])?;
    let bandwidth = float_column(batch, COLUMNS[3])?;
    let is_down = column(batch, COLUMNS[4])?
        .as_boolean_opt()
        .ok_or_else(|| type_error(COLUMNS[4]))?;
    let timestamp = column(batch, COLUMNS[5])?
        .as_primitive_opt::<TimestampMicrosecondType>()
        .ok_or_else(|| type_error(COLUMNS[5]))?;

    (0..batch.num_rows())
        .map(|row| {
            let micros = timestamp.value(row);
            let ts = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                ArrowError::ComputeError(format!("timestamp {} out of range", micros))
            })?;
            let down = if is_down.is_null(row) {
                None
            } else {
                Some(is_down.value(row))
            };
            Ok(MetricRecord::new(device_id.value(row), ts)
                .with_latency(optional_f64(latency, row))
                .with_loss(optional_f64(loss, row))
                .with_bandwidth(optional_f64(bandwidth, row))
                .with_is_down(down))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn sample() -> Vec<MetricRecord> {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 14, 30, 22).unwrap();
        vec![
            MetricRecord::new("dev-a", ts)
                .with_latency(None)
                .with_loss(Some(0.0)),
            MetricRecord::new("dev-b", ts)
                .with_latency(Some(21.5))
                .with_bandwidth(Some(940.0))
                .with_is_down(Some(true)),
        ]
    }

    #[test]
    fn test_schema_nullability() {
        let schema = network_metrics_schema();
        assert_eq!(schema.fields().len(), 6);
        assert!(!schema.field_with_name("device_id").unwrap().is_nullable());
        assert!(schema.field_with_name("latency").unwrap().is_nullable());
        assert!(schema.field_with_name("is_down").unwrap().is_nullable());
        assert!(!schema.field_with_name("timestamp").unwrap().is_nullable());
    }

    #[test]
    fn test_records_to_batch_keeps_nulls_and_zeros_apart() {
        let batch = records_to_batch(&sample()).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let latency = batch.column(1).as_primitive::<Float64Type>();
        let loss = batch.column(2).as_primitive::<Float64Type>();
        assert!(latency.is_null(0));
        assert!(!loss.is_null(0));
        assert_eq!(loss.value(0), 0.0);
        assert_eq!(latency.value(1), 21.5);
        assert!(loss.is_null(1));
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let batch = records_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert!(records_from_batch(&batch).unwrap().is_empty());
    }

    #[test]
    fn test_records_from_batch_restores_input() {
        let records = sample();
        let batch = records_to_batch(&records).unwrap();
        assert_eq!(records_from_batch(&batch).unwrap(), records);
    }

    fn arb_record() -> impl Strategy<Value = MetricRecord> {
        (
            "[a-z0-9-]{1,12}",
            proptest::option::of(0.0f64..10_000.0),
            proptest::option::of(0.0f64..1.0),
            proptest::option::of(0.0f64..10_000.0),
            proptest::option::of(any::<bool>()),
            0i64..4_000_000_000_000_000,
        )
            .prop_map(|(id, latency, loss, bandwidth, down, micros)| {
                let ts = DateTime::from_timestamp_micros(micros).unwrap();
                MetricRecord::new(id, ts)
                    .with_latency(latency)
                    .with_loss(loss)
                    .with_bandwidth(bandwidth)
                    .with_is_down(down)
            })
    }

    proptest! {
        #[test]
        fn prop_null_fidelity(records in proptest::collection::vec(arb_record(), 0..40)) {
            let batch = records_to_batch(&records).unwrap();
            let latency = batch.column(1).as_primitive::<Float64Type>();
            for (row, record) in records.iter().enumerate() {
                prop_assert_eq!(latency.is_null(row), record.latency().is_none());
            }
            prop_assert_eq!(records_from_batch(&batch).unwrap(), records);
        }
    }
}
