//! Metric record: one network observation for a device.
//!
//! Measurements are optional. `None` means the sample did not measure that
//! quantity and must survive every hop as "absent", never as `0.0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding producer payloads.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Malformed metric record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Metric record has an empty subject id")]
    EmptySubject,
}

/// A single telemetry observation.
///
/// Fields are private; once built, a record is only read and moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(alias = "device_id", alias = "deviceId")]
    subject_id: String,
    #[serde(default)]
    latency: Option<f64>,
    #[serde(default)]
    loss: Option<f64>,
    #[serde(default)]
    bandwidth: Option<f64>,
    #[serde(default, alias = "isDown")]
    is_down: Option<bool>,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a record with no measurements.
    pub fn new(subject_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        MetricRecord {
            subject_id: subject_id.into(),
            latency: None,
            loss: None,
            bandwidth: None,
            is_down: None,
            timestamp,
        }
    }

    /// Create a record stamped with the current time.
    pub fn now(subject_id: impl Into<String>) -> Self {
        Self::new(subject_id, Utc::now())
    }

    pub fn with_latency(mut self, latency: Option<f64>) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_loss(mut self, loss: Option<f64>) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: Option<f64>) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn with_is_down(mut self, is_down: Option<bool>) -> Self {
        self.is_down = is_down;
        self
    }

    /// Decode one JSON line as produced by device agents.
    pub fn from_json_line(line: &str) -> Result<Self, RecordError> {
        let record: MetricRecord = serde_json::from_str(line.trim())?;
        if record.subject_id.trim().is_empty() {
            return Err(RecordError::EmptySubject);
        }
        Ok(record)
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn latency(&self) -> Option<f64> {
        self.latency
    }

    pub fn loss(&self) -> Option<f64> {
        self.loss
    }

    pub fn bandwidth(&self) -> Option<f64> {
        self.bandwidth
    }

    pub fn is_down(&self) -> Option<bool> {
        self.is_down
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 14, 30, 22).unwrap()
    }

    #[test]
    fn test_new_record_has_no_measurements() {
        let record = MetricRecord::new("dev-1", ts());
        assert_eq!(record.subject_id(), "dev-1");
        assert_eq!(record.latency(), None);
        assert_eq!(record.loss(), None);
        assert_eq!(record.bandwidth(), None);
        assert_eq!(record.is_down(), None);
        assert_eq!(record.timestamp(), ts());
    }

    #[test]
    fn test_builder_keeps_zero_distinct_from_absent() {
        let record = MetricRecord::new("dev-1", ts())
            .with_latency(None)
            .with_loss(Some(0.0))
            .with_is_down(Some(false));
        assert_eq!(record.latency(), None);
        assert_eq!(record.loss(), Some(0.0));
        assert_eq!(record.is_down(), Some(false));
    }

    #[test]
    fn test_from_json_line_accepts_device_id_alias() {
        let line = r#"{"device_id":"dev-9","latency":12.5,"loss":0.0,"is_down":false,"timestamp":"2026-01-15T14:30:22Z"}"#;
        let record = MetricRecord::from_json_line(line).unwrap();
        assert_eq!(record.subject_id(), "dev-9");
        assert_eq!(record.latency(), Some(12.5));
        assert_eq!(record.loss(), Some(0.0));
        assert_eq!(record.bandwidth(), None);
        assert_eq!(record.is_down(), Some(false));
        assert_eq!(record.timestamp(), ts());
    }

    #[test]
    fn test_from_json_line_null_is_absent() {
        let line = r#"{"subject_id":"dev-2","latency":null,"timestamp":"2026-01-15T14:30:22Z"}"#;
        let record = MetricRecord::from_json_line(line).unwrap();
        assert_eq!(record.latency(), None);
        assert_eq!(record.is_down(), None);
    }

    #[test]
    fn test_from_json_line_rejects_empty_subject() {
        let line = r#"{"subject_id":"  ","timestamp":"2026-01-15T14:30:22Z"}"#;
        assert!(matches!(
            MetricRecord::from_json_line(line),
            Err(RecordError::EmptySubject)
        ));
    }

    #[test]
    fn test_from_json_line_rejects_missing_timestamp() {
        let line = r#"{"subject_id":"dev-3"}"#;
        assert!(matches!(
            MetricRecord::from_json_line(line),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn test_serialize_emits_null_for_absent() {
        let record = MetricRecord::new("dev-1", ts()).with_loss(Some(0.0));
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(json["latency"].is_null());
        assert_eq!(json["loss"], serde_json::json!(0.0));
    }
}
