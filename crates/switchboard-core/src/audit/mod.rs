//! Fire-and-forget audit queue.
//!
//! Callers hand records to a bounded `mpsc` channel with `try_send`, so
//! enqueueing never waits. A single background task feeds them to the
//! [`AuditSink`] one at a time. When the queue is full the record is
//! dropped with a warning; a failing sink is logged and skipped.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use switchboard_types::audit::AuditRecord;

use crate::repository::audit::AuditSink;

/// Counters reported by the consumer when the queue shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub recorded: usize,
    pub failed: usize,
}

/// Cloneable enqueue side of the audit queue.
#[derive(Debug, Clone)]
pub struct AuditQueueHandle {
    tx: Option<mpsc::Sender<AuditRecord>>,
}

impl AuditQueueHandle {
    /// A handle that discards everything, for when auditing is turned off.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue `record` without waiting. Returns whether it was accepted.
    pub fn enqueue(&self, record: AuditRecord) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                warn!(record_id = %record.id, operation = %record.operation, "Audit queue full, dropping record");
                false
            }
            Err(TrySendError::Closed(record)) => {
                warn!(record_id = %record.id, operation = %record.operation, "Audit queue closed, dropping record");
                false
            }
        }
    }
}

/// Owns the background consumer of the audit queue.
pub struct BackgroundAuditQueue {
    handle: AuditQueueHandle,
    stop: CancellationToken,
    worker: JoinHandle<AuditStats>,
}

impl BackgroundAuditQueue {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn<S: AuditSink + 'static>(sink: S, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = CancellationToken::new();
        let worker = tokio::spawn(consume(sink, rx, stop.clone()));
        debug!(capacity, "Audit queue started");

        Self {
            handle: AuditQueueHandle { tx: Some(tx) },
            stop,
            worker,
        }
    }

    /// A handle for enqueueing from elsewhere.
    pub fn handle(&self) -> AuditQueueHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, record: AuditRecord) -> bool {
        self.handle.enqueue(record)
    }

    /// Close the queue, write whatever is still pending, and stop.
    ///
    /// Records enqueued through other handles after this point are dropped.
    pub async fn shutdown(self) -> AuditStats {
        self.stop.cancel();
        drop(self.handle);
        match self.worker.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Audit consumer task failed");
                AuditStats::default()
            }
        }
    }
}

async fn consume<S: AuditSink>(
    sink: S,
    mut rx: mpsc::Receiver<AuditRecord>,
    stop: CancellationToken,
) -> AuditStats {
    let mut stats = AuditStats::default();

    loop {
        tokio::select! {
            biased;
            record = rx.recv() => match record {
                Some(record) => write(&sink, &record, &mut stats).await,
                None => break,
            },
            _ = stop.cancelled() => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    write(&sink, &record, &mut stats).await;
                }
                break;
            }
        }
    }

    debug!(recorded = stats.recorded, failed = stats.failed, "Audit queue drained");
    stats
}

async fn write<S: AuditSink>(sink: &S, record: &AuditRecord, stats: &mut AuditStats) {
    match sink.record(record).await {
        Ok(()) => stats.recorded += 1,
        Err(e) => {
            stats.failed += 1;
            warn!(record_id = %record.id, operation = %record.operation, error = %e, "Audit sink failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use switchboard_types::error::RepositoryError;
    use switchboard_types::llm::InvocationResult;

    #[derive(Clone, Default)]
    struct CollectingSink {
        records: Arc<Mutex<Vec<String>>>,
        fail_operation: Option<&'static str>,
    }

    impl AuditSink for CollectingSink {
        fn record(&self, record: &AuditRecord) -> impl Future<Output = Result<(), RepositoryError>> + Send {
            let result = if self.fail_operation == Some(record.operation.as_str()) {
                Err(RepositoryError::Query("disk full".to_string()))
            } else {
                self.records.lock().unwrap().push(record.operation.clone());
                Ok(())
            };
            async move { result }
        }
    }

    fn record(operation: &str) -> AuditRecord {
        AuditRecord::new(
            operation,
            "prompt",
            InvocationResult::exhausted(1, Duration::from_millis(5)),
            Utc::now(),
            5,
        )
    }

    #[tokio::test]
    async fn test_records_written_in_order() {
        let sink = CollectingSink::default();
        let queue = BackgroundAuditQueue::spawn(sink.clone(), 16);
        let handle = queue.handle();

        assert!(handle.enqueue(record("one")));
        assert!(queue.enqueue(record("two")));
        assert!(handle.enqueue(record("three")));

        let stats = queue.shutdown().await;
        assert_eq!(stats, AuditStats { recorded: 3, failed: 0 });
        assert_eq!(*sink.records.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = CollectingSink::default();
        let queue = BackgroundAuditQueue::spawn(sink.clone(), 2);

        // The consumer cannot run until this task yields.
        assert!(queue.enqueue(record("a")));
        assert!(queue.enqueue(record("b")));
        assert!(!queue.enqueue(record("c")));

        let stats = queue.shutdown().await;
        assert_eq!(stats.recorded, 2);
        assert_eq!(*sink.records.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_queue() {
        let sink = CollectingSink {
            fail_operation: Some("bad"),
            ..CollectingSink::default()
        };
        let queue = BackgroundAuditQueue::spawn(sink.clone(), 8);

        queue.enqueue(record("good-1"));
        queue.enqueue(record("bad"));
        queue.enqueue(record("good-2"));

        let stats = queue.shutdown().await;
        assert_eq!(stats, AuditStats { recorded: 2, failed: 1 });
        assert_eq!(*sink.records.lock().unwrap(), vec!["good-1", "good-2"]);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_rejected() {
        let queue = BackgroundAuditQueue::spawn(CollectingSink::default(), 4);
        let handle = queue.handle();
        queue.shutdown().await;

        assert!(!handle.enqueue(record("late")));
    }

    #[test]
    fn test_disabled_handle_discards() {
        let handle = AuditQueueHandle::disabled();
        assert!(!handle.is_enabled());
        assert!(!handle.enqueue(record("ignored")));
    }
}
