//! Bounded metrics batcher.
//!
//! Producers call [`BatcherHandle::add`], which never blocks: when the ingress
//! queue is full the record is dropped and a warning is logged. A single
//! [`BatchWorker`] owns the accumulator and flushes it when it reaches the
//! batch size, on every interval tick if it is non-empty, and once more on
//! shutdown. Each flush moves the accumulator into a spawned write task, so
//! sink latency never stalls the worker and several writes may overlap.
//!
//! Delivery is at-most-once:
//! - records still queued (not yet dequeued) when the worker stops are lost
//! - a failed or timed-out write drops its batch without retry
//! - writes spawned before the final flush are not awaited on shutdown

use std::sync::Arc;
use std::time::Duration;

use pm_common::{BatcherConfig, MetricRecord};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events;
use crate::sink::MetricSink;
use crate::stats::{BatcherStats, StatsSnapshot};

/// Why a flush happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Accumulator reached the batch size.
    Size,
    /// Interval tick with a non-empty accumulator.
    Interval,
    /// Final flush on stop.
    Shutdown,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushReason::Size => write!(f, "size"),
            FlushReason::Interval => write!(f, "interval"),
            FlushReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Create a connected handle/worker pair.
///
/// The worker does nothing until [`BatchWorker::run`] is awaited, usually on
/// its own task. Records added before that wait in the ingress queue.
pub fn channel(config: &BatcherConfig, sink: Arc<dyn MetricSink>) -> (BatcherHandle, BatchWorker) {
    let capacity = config.queue_capacity.max(1);
    let batch_size = config.batch_size.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let (stop_tx, stop_rx) = mpsc::channel(1);
    let stats = Arc::new(BatcherStats::new());

    let handle = BatcherHandle {
        tx,
        stop_tx,
        stats: stats.clone(),
    };
    let worker = BatchWorker {
        rx,
        stop_rx,
        sink,
        stats,
        batch: Vec::with_capacity(batch_size),
        batch_size,
        flush_interval: config.flush_interval().max(Duration::from_millis(1)),
        write_timeout: config.write_timeout(),
    };
    (handle, worker)
}

/// Producer side of the batcher. Cheap to clone and share across tasks.
#[derive(Debug, Clone)]
pub struct BatcherHandle {
    tx: mpsc::Sender<MetricRecord>,
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    stats: Arc<BatcherStats>,
}

impl BatcherHandle {
    /// Queue a record for the next flush. Never blocks and never fails.
    pub fn add(&self, record: MetricRecord) {
        match self.tx.try_send(record) {
            Ok(()) => self.stats.record_accepted(),
            Err(TrySendError::Full(record)) => {
                self.stats.record_dropped();
                warn!(
                    event = events::RECORD_DROPPED,
                    subject_id = %record.subject_id(),
                    capacity = self.tx.max_capacity(),
                    "Metrics buffer full, dropping data packet"
                );
            }
            Err(TrySendError::Closed(record)) => {
                self.stats.record_dropped();
                warn!(
                    event = events::RECORD_DROPPED,
                    subject_id = %record.subject_id(),
                    "Metrics worker stopped, dropping data packet"
                );
            }
        }
    }

    /// Ask the worker to flush what it holds and exit.
    ///
    /// Returns once the worker has accepted the request (or has already
    /// exited). Does not wait for the final write to land.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.stop_tx.send(ack_tx).await.is_err() {
            debug!("Metrics worker already stopped");
            return;
        }
        // Err means the worker exited without reading this request.
        let _ = ack_rx.await;
    }

    /// Records waiting in the ingress queue.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Wait until the worker has dequeued everything queued so far.
    ///
    /// Polls the queue depth every 5 ms; there is no wakeup from the worker.
    /// Producers that are done should call this before [`stop`](Self::stop),
    /// since records still queued at stop are lost. Returns `false` on timeout
    /// or if the worker exited with records still queued.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let drained = time::timeout(timeout, async {
            while self.pending() > 0 && !self.is_closed() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok();
        drained && self.pending() == 0
    }

    /// Whether the worker has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Consumer side: sole owner of the accumulator.
pub struct BatchWorker {
    rx: mpsc::Receiver<MetricRecord>,
    stop_rx: mpsc::Receiver<oneshot::Sender<()>>,
    sink: Arc<dyn MetricSink>,
    stats: Arc<BatcherStats>,
    batch: Vec<MetricRecord>,
    batch_size: usize,
    flush_interval: Duration,
    write_timeout: Duration,
}

impl BatchWorker {
    /// Run the event loop until stopped or every handle is dropped.
    ///
    /// Returns the write task of the final flush, if there was anything left
    /// to flush, so the caller may await it before closing the store.
    pub async fn run(mut self) -> Option<JoinHandle<()>> {
        info!(
            event = events::WORKER_STARTED,
            sink = self.sink.name(),
            batch_size = self.batch_size,
            queue_capacity = self.rx.max_capacity(),
            flush_interval_secs = self.flush_interval.as_secs_f64(),
            "Metrics batch worker started"
        );

        let mut ticker = time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(record) => {
                        self.batch.push(record);
                        if self.batch.len() >= self.batch_size {
                            self.flush(FlushReason::Size);
                        }
                    }
                    None => {
                        debug!("All metrics handles dropped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush(FlushReason::Interval);
                    }
                }
                stop = self.stop_rx.recv() => {
                    if let Some(ack) = stop {
                        let _ = ack.send(());
                    }
                    break;
                }
            }
        }

        info!(
            event = events::WORKER_STOPPING,
            buffered = self.batch.len(),
            queued = self.rx.len(),
            "Metrics batch worker stopping"
        );
        let final_write = if self.batch.is_empty() {
            None
        } else {
            Some(self.flush(FlushReason::Shutdown))
        };
        info!(event = events::WORKER_STOPPED, "Metrics batch worker stopped");
        final_write
    }

    /// Hand the accumulator to a new write task and start a fresh one.
    ///
    /// Callers guarantee the accumulator is non-empty.
    fn flush(&mut self, reason: FlushReason) -> JoinHandle<()> {
        debug_assert!(!self.batch.is_empty());
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let batch_id = Uuid::new_v4();
        debug!(
            event = events::BATCH_FLUSHING,
            %batch_id,
            %reason,
            rows = batch.len(),
            "Flushing metrics batch"
        );
        tokio::spawn(write_batch(
            self.sink.clone(),
            batch,
            batch_id,
            reason,
            self.write_timeout,
            self.stats.clone(),
        ))
    }
}

/// Write one frozen batch under a deadline. Failures end here, in a log line.
async fn write_batch(
    sink: Arc<dyn MetricSink>,
    batch: Vec<MetricRecord>,
    batch_id: Uuid,
    reason: FlushReason,
    timeout: Duration,
    stats: Arc<BatcherStats>,
) {
    let rows = batch.len();
    match time::timeout(timeout, sink.write_batch(&batch)).await {
        Ok(Ok(written)) => {
            stats.record_flush_ok(rows);
            info!(
                event = events::BATCH_FLUSHED,
                %batch_id,
                %reason,
                rows,
                written,
                sink = sink.name(),
                "Flushed {} metrics to {}",
                rows,
                sink.name()
            );
        }
        Ok(Err(e)) => {
            stats.record_flush_failed(rows);
            error!(
                event = events::BATCH_FAILED,
                %batch_id,
                %reason,
                rows,
                sink = sink.name(),
                error = %e,
                "Error flushing metrics batch"
            );
        }
        Err(_) => {
            stats.record_flush_failed(rows);
            error!(
                event = events::BATCH_TIMED_OUT,
                %batch_id,
                %reason,
                rows,
                sink = sink.name(),
                timeout_secs = timeout.as_secs_f64(),
                "Metrics batch write timed out"
            );
        }
    }
}

/// A batcher whose worker runs on its own Tokio task.
///
/// Must be created from within a Tokio runtime.
pub struct MetricsBatcher {
    handle: BatcherHandle,
    worker: JoinHandle<Option<JoinHandle<()>>>,
}

impl MetricsBatcher {
    pub fn spawn(config: &BatcherConfig, sink: Arc<dyn MetricSink>) -> Self {
        let (handle, worker) = channel(config, sink);
        MetricsBatcher {
            handle,
            worker: tokio::spawn(worker.run()),
        }
    }

    /// A producer handle for request-handling code.
    pub fn handle(&self) -> BatcherHandle {
        self.handle.clone()
    }

    pub fn add(&self, record: MetricRecord) {
        self.handle.add(record);
    }

    /// Stop the worker, wait for it to exit and for its final write to finish.
    ///
    /// Earlier writes that are still in flight are not awaited.
    pub async fn shutdown(self) -> StatsSnapshot {
        self.handle.stop().await;
        match self.worker.await {
            Ok(Some(final_write)) => {
                if let Err(e) = final_write.await {
                    error!(error = %e, "Final metrics write task failed");
                }
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "Metrics batch worker task failed"),
        }
        self.handle.stats()
    }
}
