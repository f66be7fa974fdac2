//! Event sinks.
//!
//! # Data Flow
//! ```text
//! Pipeline worker (one per sink)
//!     → Sink::deliver(&LogEvent)
//!         console.rs: JSON line → writer (stdout)
//!         queue.rs:   JSON value keyed by source name → MessageProducer
//!                        kafka.rs: rdkafka producer (feature "kafka")
//!
//! Shutdown:
//!     → Sink::flush() bounded by Sink::flush_timeout()
//! ```
//!
//! # Design Decisions
//! - Delivery errors are returned to the worker, which logs and moves on
//! - No retries, no dead-letter path: at-most-once
//! - Sinks are shared as `Arc<dyn Sink>` between worker and flush action

pub mod console;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod queue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::event::LogEvent;

pub use console::ConsoleSink;
#[cfg(feature = "kafka")]
pub use kafka::KafkaProducer;
pub use queue::{MessageProducer, PendingWrites, ProducerStats, QueueSink, WriteGuard};

/// Flush bound used by sinks that do not declare their own.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while delivering or flushing events.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not supported by this build")]
    Unsupported(&'static str),
}

/// A destination for log events.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist or forward one event.
    async fn deliver(&self, event: &LogEvent) -> Result<(), SinkError>;

    /// Best-effort drain of anything buffered inside the sink, then release
    /// its resources. Called once during shutdown.
    async fn flush(&self) -> Result<(), SinkError>;

    /// How long shutdown waits for [`Sink::flush`] to complete.
    fn flush_timeout(&self) -> Duration {
        DEFAULT_FLUSH_TIMEOUT
    }
}
