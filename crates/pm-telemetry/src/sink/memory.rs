//! In-memory sink for tests and dry runs.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pm_common::MetricRecord;

use super::{MetricSink, SinkResult};

/// Keeps every written batch, in order of write completion.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<MetricRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<MetricRecord>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All batches written so far.
    pub fn batches(&self) -> Vec<Vec<MetricRecord>> {
        self.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.lock().len()
    }

    pub fn record_count(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    /// Wait until at least `count` batches have landed, or `timeout` elapses.
    ///
    /// Polls every 5 ms.
    pub async fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.batch_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write_batch(&self, batch: &[MetricRecord]) -> SinkResult<u64> {
        self.lock().push(batch.to_vec());
        Ok(batch.len() as u64)
    }
}
