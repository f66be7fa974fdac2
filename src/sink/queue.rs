//! Durable queue sink.
//!
//! Events are serialized to JSON and handed to a [`MessageProducer`] keyed by
//! the event's source name. The producer batches and delivers on its own
//! schedule; `flush` waits for it to go idle and then closes it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::event::LogEvent;
use crate::lifecycle::wait_until_timeout;
use crate::sink::{Sink, SinkError};

/// Time reserved for closing the producer after the idle wait.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between producer idle checks during flush.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outstanding work inside a producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Messages accepted but not yet acknowledged by the broker.
    pub pending_messages: usize,
    /// Write requests still in flight.
    pub pending_writes: usize,
}

impl ProducerStats {
    pub fn is_idle(&self) -> bool {
        self.pending_messages == 0 && self.pending_writes == 0
    }
}

/// Writes handed to the broker whose delivery report has not arrived yet.
///
/// Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites(Arc<AtomicUsize>);

/// One outstanding write; the count drops when the guard does.
#[derive(Debug)]
pub struct WriteGuard(Arc<AtomicUsize>);

impl PendingWrites {
    /// Count a write until the returned guard is dropped.
    pub fn begin(&self) -> WriteGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        WriteGuard(Arc::clone(&self.0))
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A batching message-broker producer.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Enqueue one message. May return before the broker acknowledges it.
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), SinkError>;

    /// Current outstanding work.
    fn stats(&self) -> ProducerStats;

    /// Release the broker connection.
    async fn close(&self) -> Result<(), SinkError>;
}

/// Sink delivering events through a [`MessageProducer`].
pub struct QueueSink<P> {
    producer: P,
    flush_timeout: Duration,
}

impl<P: MessageProducer> QueueSink<P> {
    pub fn new(producer: P, flush_timeout: Duration) -> Self {
        Self {
            producer,
            flush_timeout,
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }
}

#[async_trait]
impl<P: MessageProducer> Sink for QueueSink<P> {
    async fn deliver(&self, event: &LogEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(event)?;
        self.producer.send(event.name.as_bytes(), &payload).await
    }

    async fn flush(&self) -> Result<(), SinkError> {
        tracing::info!("Flushing queue producer ...");
        let idle = wait_until_timeout(self.flush_timeout, IDLE_POLL_INTERVAL, || {
            self.producer.stats().is_idle()
        })
        .await;
        if idle {
            tracing::info!("Flushing queue producer done");
        } else {
            let stats = self.producer.stats();
            tracing::warn!(
                pending_messages = stats.pending_messages,
                pending_writes = stats.pending_writes,
                timeout = ?self.flush_timeout,
                "Queue producer still busy after flush timeout"
            );
        }

        tracing::info!("Closing queue producer ...");
        self.producer.close().await?;
        tracing::info!("Closing queue producer done");
        Ok(())
    }

    fn flush_timeout(&self) -> Duration {
        self.flush_timeout + CLOSE_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TraceDeltas;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// In-memory producer whose pending count drains on demand.
    #[derive(Default)]
    struct MemoryProducer {
        sent: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
        pending: Arc<AtomicUsize>,
        closed: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl MessageProducer for MemoryProducer {
        async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Delivery("broker unavailable".into()));
            }
            self.sent.lock().unwrap().push((key.to_vec(), payload.to_vec()));
            self.pending.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stats(&self) -> ProducerStats {
            ProducerStats {
                pending_messages: self.pending.load(Ordering::SeqCst),
                pending_writes: 0,
            }
        }

        async fn close(&self) -> Result<(), SinkError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> LogEvent {
        LogEvent {
            name: "edge".into(),
            timestamp: 42,
            url: "http://x/".into(),
            method: "GET".into(),
            status: 200,
            trace: TraceDeltas::default(),
        }
    }

    #[tokio::test]
    async fn deliver_keys_by_source_name() {
        let sink = QueueSink::new(MemoryProducer::default(), Duration::from_millis(50));
        sink.deliver(&event()).await.unwrap();

        let sent = sink.producer().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, b"edge".to_vec());
        let decoded: LogEvent = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(decoded, event());
    }

    #[tokio::test]
    async fn deliver_surfaces_producer_errors() {
        let producer = MemoryProducer {
            fail: true,
            ..Default::default()
        };
        let sink = QueueSink::new(producer, Duration::from_millis(50));
        let err = sink.deliver(&event()).await.unwrap_err();
        assert!(matches!(err, SinkError::Delivery(_)));
    }

    #[tokio::test]
    async fn flush_waits_for_idle_then_closes() {
        let sink = QueueSink::new(MemoryProducer::default(), Duration::from_secs(5));
        sink.deliver(&event()).await.unwrap();

        let pending = Arc::clone(&sink.producer().pending);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            pending.store(0, Ordering::SeqCst);
        });

        let started = std::time::Instant::now();
        sink.flush().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(sink.producer().closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn flush_closes_after_timeout_when_busy() {
        let sink = QueueSink::new(MemoryProducer::default(), Duration::from_millis(100));
        sink.deliver(&event()).await.unwrap();

        sink.flush().await.unwrap();
        assert!(sink.producer().closed.load(Ordering::SeqCst));
        assert_eq!(sink.producer().stats().pending_messages, 1);
    }

    #[tokio::test]
    async fn pending_writes_follow_guards() {
        let pending = PendingWrites::default();
        let first = pending.begin();
        let second = pending.clone().begin();
        assert_eq!(pending.count(), 2);

        drop(first);
        assert_eq!(pending.count(), 1);

        let report = tokio::spawn(async move {
            let _write = second;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(pending.count(), 1);
        report.await.unwrap();
        assert_eq!(pending.count(), 0);
    }

    #[tokio::test]
    async fn aborted_report_task_releases_its_write() {
        let pending = PendingWrites::default();
        let write = pending.begin();
        let report = tokio::spawn(async move {
            let _write = write;
            std::future::pending::<()>().await;
        });
        assert_eq!(pending.count(), 1);

        report.abort();
        assert!(report.await.unwrap_err().is_cancelled());
        assert_eq!(pending.count(), 0);
    }
}
