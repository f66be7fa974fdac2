//! Listener shutdown signal.
//!
//! A latched flag rather than a one-shot message: a listener that subscribes
//! after the trigger still observes it.

use tokio::sync::watch;

/// Signal telling the HTTP listener to stop accepting connections.
///
/// Triggered by the pipeline once every sink has been flushed.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Receiving side of [`Shutdown`], handed to the listener.
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Latch the signal. Repeated triggers are no-ops.
    pub fn trigger(&self) {
        let listeners = self.tx.receiver_count();
        if !self.tx.send_replace(true) {
            tracing::debug!(listeners, "Listener shutdown triggered");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Resolve once shutdown was triggered, or the [`Shutdown`] was dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
