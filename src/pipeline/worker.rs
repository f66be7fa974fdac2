//! Per-sink buffer and worker task.
//!
//! # States
//! ```text
//! Running → Draining: exit action started (enqueue still accepted)
//! Draining → Closed:  sink flushed, worker stopped
//! ```
//! Closed is terminal. Events still buffered at close are counted as dropped.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Notify};

use crate::config::BackpressurePolicy;
use crate::event::LogEvent;
use crate::lifecycle::{wait_until_timeout, ShutdownError};
use crate::observability::metrics;
use crate::sink::Sink;

/// Interval between buffer checks while draining.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of a sink worker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Running = 0,
    Draining = 1,
    Closed = 2,
}

impl From<u8> for SinkState {
    fn from(val: u8) -> Self {
        match val {
            1 => SinkState::Draining,
            2 => SinkState::Closed,
            _ => SinkState::Running,
        }
    }
}

/// Result of offering an event to one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Buffer stayed full past the `DropAfter` wait.
    Dropped,
    /// Worker already stopped.
    Closed,
}

/// Producer side of a sink's buffer.
#[derive(Clone)]
pub struct SinkHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Arc<LogEvent>>,
    /// Events enqueued and not yet delivered (including the one in flight).
    pending: Arc<AtomicUsize>,
    state: Arc<AtomicU8>,
    dropped: Arc<AtomicU64>,
}

impl SinkHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events accepted but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn state(&self) -> SinkState {
        SinkState::from(self.state.load(Ordering::SeqCst))
    }

    /// Events this sink never delivered because of backpressure or close.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Offer an event to the buffer according to `policy`.
    pub(crate) async fn enqueue(
        &self,
        event: Arc<LogEvent>,
        policy: BackpressurePolicy,
    ) -> EnqueueOutcome {
        // Counted before the send so the worker can never decrement first.
        self.pending.fetch_add(1, Ordering::SeqCst);
        let mut reservation = PendingReservation {
            pending: &self.pending,
            armed: true,
        };

        let outcome = match policy {
            BackpressurePolicy::Block => match self.tx.send(event).await {
                Ok(()) => EnqueueOutcome::Accepted,
                Err(_) => EnqueueOutcome::Closed,
            },
            BackpressurePolicy::DropAfter { wait_ms } => {
                match self.tx.send_timeout(event, Duration::from_millis(wait_ms)).await {
                    Ok(()) => EnqueueOutcome::Accepted,
                    Err(SendTimeoutError::Timeout(_)) => EnqueueOutcome::Dropped,
                    Err(SendTimeoutError::Closed(_)) => EnqueueOutcome::Closed,
                }
            }
        };

        match outcome {
            EnqueueOutcome::Accepted => {
                reservation.armed = false;
                metrics::record_buffer_depth(&self.name, self.buffered());
            }
            EnqueueOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped(&self.name, "backpressure");
                tracing::warn!(sink = %self.name, "Sink buffer full, event dropped");
            }
            EnqueueOutcome::Closed => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped(&self.name, "closed");
                tracing::debug!(sink = %self.name, "Sink closed, event dropped");
            }
        }
        outcome
    }
}

/// Releases a `pending` slot unless the event made it into the buffer.
///
/// Also covers a publisher cancelled while blocked on a full buffer.
struct PendingReservation<'a> {
    pending: &'a AtomicUsize,
    armed: bool,
}

impl Drop for PendingReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Control side of a running worker, owned by its exit action.
pub(crate) struct SinkWorker {
    handle: SinkHandle,
    sink: Arc<dyn Sink>,
    stop: Arc<Notify>,
}

/// Create the buffer for `sink` and spawn its worker task.
pub(crate) fn spawn(name: &str, sink: Arc<dyn Sink>, capacity: usize) -> (SinkHandle, SinkWorker) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = SinkHandle {
        name: Arc::from(name),
        tx,
        pending: Arc::new(AtomicUsize::new(0)),
        state: Arc::new(AtomicU8::new(SinkState::Running as u8)),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let stop = Arc::new(Notify::new());

    tokio::spawn(run(handle.clone(), Arc::clone(&sink), rx, Arc::clone(&stop)));
    tracing::info!(sink = %name, capacity, "Sink worker started");

    let worker = SinkWorker {
        handle: handle.clone(),
        sink,
        stop,
    };
    (handle, worker)
}

async fn run(
    handle: SinkHandle,
    sink: Arc<dyn Sink>,
    mut rx: mpsc::Receiver<Arc<LogEvent>>,
    stop: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => break,
            received = rx.recv() => match received {
                Some(event) => {
                    match sink.deliver(&event).await {
                        Ok(()) => metrics::record_delivery(&handle.name, true),
                        Err(e) => {
                            tracing::warn!(sink = %handle.name, error = %e, "Failed to deliver event");
                            metrics::record_delivery(&handle.name, false);
                        }
                    }
                    handle.pending.fetch_sub(1, Ordering::SeqCst);
                }
                None => break,
            },
        }
    }

    rx.close();
    let mut lost = 0u64;
    while rx.try_recv().is_ok() {
        handle.pending.fetch_sub(1, Ordering::SeqCst);
        lost += 1;
    }
    if lost > 0 {
        handle.dropped.fetch_add(lost, Ordering::Relaxed);
        metrics::record_events_lost(&handle.name, lost);
        tracing::warn!(sink = %handle.name, lost, "Sink closed with buffered events");
    }

    handle.state.store(SinkState::Closed as u8, Ordering::SeqCst);
    tracing::info!(sink = %handle.name, "Sink worker stopped");
}

impl SinkWorker {
    /// Drain the buffer (bounded), flush the sink (bounded), stop the worker.
    pub(crate) async fn drain_and_close(self, drain_timeout: Duration) -> Result<(), ShutdownError> {
        let SinkWorker { handle, sink, stop } = self;
        let name = handle.name().to_string();
        handle.state.store(SinkState::Draining as u8, Ordering::SeqCst);

        tracing::info!(sink = %name, buffered = handle.buffered(), "Flushing sink ...");
        let drained =
            wait_until_timeout(drain_timeout, DRAIN_POLL_INTERVAL, || handle.buffered() == 0).await;
        if drained {
            tracing::info!(sink = %name, "Flushing sink done");
        } else {
            tracing::warn!(
                sink = %name,
                remaining = handle.buffered(),
                timeout = ?drain_timeout,
                "Drain timeout reached, flushing anyway"
            );
        }

        let flush_timeout = sink.flush_timeout();
        // The flush keeps running if the wait below gives up on it.
        let flush = tokio::spawn(async move { sink.flush().await });
        let result = match tokio::time::timeout(flush_timeout, flush).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(ShutdownError::Flush {
                sink: name.clone(),
                source,
            }),
            Ok(Err(_)) => Err(ShutdownError::Panicked { name: name.clone() }),
            Err(_) => Err(ShutdownError::FlushTimeout {
                sink: name.clone(),
                timeout: flush_timeout,
            }),
        };

        stop.notify_one();
        result
    }
}
