//! JSON-lines producer: feeds decoded records into a batcher handle.

use pm_common::MetricRecord;
use pm_telemetry::BatcherHandle;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

pub const LINE_MALFORMED: &str = "ingest.line_malformed";
pub const INPUT_CLOSED: &str = "ingest.input_closed";

/// Counts for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines that did not decode to a record and were skipped.
    pub malformed: u64,
}

/// Read records line by line until EOF, handing each to `handle`.
///
/// Blank lines are ignored. Counts are written to `summary` as they happen so
/// they survive the future being cancelled.
pub async fn pump_lines<R>(
    reader: R,
    handle: &BatcherHandle,
    summary: &mut IngestSummary,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        match MetricRecord::from_json_line(&line) {
            Ok(record) => handle.add(record),
            Err(e) => {
                summary.malformed += 1;
                warn!(event = LINE_MALFORMED, line_no, error = %e, "Skipping malformed metric line");
            }
        }
    }
    debug!(event = INPUT_CLOSED, lines = summary.lines, "Input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_common::BatcherConfig;
    use pm_telemetry::{channel, MemorySink};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pump_counts_and_skips_bad_lines() {
        let (handle, _worker) = channel(&BatcherConfig::default(), Arc::new(MemorySink::new()));
        let input = concat!(
            r#"{"device_id":"dev-1","latency":12.5,"timestamp":"2026-01-15T14:30:22Z"}"#,
            "\n",
            "\n",
            "not json\n",
            r#"{"deviceId":"dev-2","isDown":true,"timestamp":"2026-01-15T14:30:23Z"}"#,
            "\n",
            r#"{"device_id":"","timestamp":"2026-01-15T14:30:24Z"}"#,
            "\n",
        );

        let mut summary = IngestSummary::default();
        pump_lines(input.as_bytes(), &handle, &mut summary)
            .await
            .unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.malformed, 2);
        assert_eq!(handle.stats().accepted, 2);
        assert_eq!(handle.pending(), 2);
    }

    #[tokio::test]
    async fn test_pump_empty_input() {
        let (handle, _worker) = channel(&BatcherConfig::default(), Arc::new(MemorySink::new()));
        let mut summary = IngestSummary::default();
        pump_lines(&b""[..], &handle, &mut summary).await.unwrap();
        assert_eq!(summary, IngestSummary::default());
    }
}
