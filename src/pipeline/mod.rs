//! Log event pipeline.
//!
//! # Data Flow
//! ```text
//! Request path:
//!     LogEvent → dispatcher.rs publish (blocking enqueue per sink)
//!         → worker.rs buffer (bounded mpsc) → worker task → Sink::deliver
//!
//! Shutdown:
//!     Pipeline::shutdown → ShutdownCoordinator (one action per sink,
//!         registration order, console first) → listener signal
//! ```
//!
//! # Design Decisions
//! - The pipeline is an owned object built once at startup, not global state
//! - The console sink always exists and is registered first
//! - One worker task per sink; sinks never share mutable state

pub mod dispatcher;
pub mod worker;

use std::io::Write;
use std::sync::Arc;

use crate::config::{PipelineConfig, ProxyConfig};
use crate::event::LogEvent;
use crate::lifecycle::{Shutdown, ShutdownCoordinator, ShutdownReport};
use crate::sink::{ConsoleSink, Sink, SinkError};

pub use dispatcher::Dispatcher;
pub use worker::{EnqueueOutcome, SinkHandle, SinkState};

/// Name of the always-present console sink.
pub const CONSOLE_SINK: &str = "console";
/// Name of the durable queue sink.
pub const QUEUE_SINK: &str = "queue";

/// Dispatcher plus the exit actions that flush its sinks.
pub struct Pipeline {
    dispatcher: Dispatcher,
    coordinator: ShutdownCoordinator,
}

/// Registers sinks in order; the console sink is always first.
pub struct PipelineBuilder {
    config: PipelineConfig,
    sinks: Vec<SinkHandle>,
    coordinator: ShutdownCoordinator,
}

impl PipelineBuilder {
    /// Start a pipeline whose first sink is `console`.
    ///
    /// Must be called inside a Tokio runtime: sink workers are spawned here.
    pub fn new<W>(config: PipelineConfig, console: ConsoleSink<W>) -> Self
    where
        W: Write + Send + 'static,
    {
        let builder = Self {
            config,
            sinks: Vec::new(),
            coordinator: ShutdownCoordinator::new(),
        };
        builder.with_sink(CONSOLE_SINK, Arc::new(console))
    }

    /// Add a sink with its own buffer and worker, and register its flush.
    pub fn with_sink(mut self, name: &str, sink: Arc<dyn Sink>) -> Self {
        let (handle, worker) = worker::spawn(name, sink, self.config.buffer_capacity);
        let drain_timeout = self.config.drain_timeout();
        self.coordinator
            .register(name, move || worker.drain_and_close(drain_timeout));
        self.sinks.push(handle);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            dispatcher: Dispatcher::new(self.sinks, self.config.backpressure),
            coordinator: self.coordinator,
        }
    }
}

impl Pipeline {
    pub fn builder<W>(config: PipelineConfig, console: ConsoleSink<W>) -> PipelineBuilder
    where
        W: Write + Send + 'static,
    {
        PipelineBuilder::new(config, console)
    }

    /// Console sink on stdout, plus the queue sink when configured.
    ///
    /// A configured queue sink that cannot be built is an error, never a
    /// silent fallback to console-only.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, SinkError> {
        if !config.queue.is_enabled() {
            tracing::info!("Queue sink disabled: broker address and topic are both required");
            return Ok(PipelineBuilder::new(config.pipeline.clone(), ConsoleSink::stdout()).build());
        }

        #[cfg(feature = "kafka")]
        {
            use crate::sink::{KafkaProducer, QueueSink};

            let producer = KafkaProducer::new(&config.queue)?;
            let queue = QueueSink::new(producer, config.queue.flush_timeout());
            Ok(PipelineBuilder::new(config.pipeline.clone(), ConsoleSink::stdout())
                .with_sink(QUEUE_SINK, Arc::new(queue))
                .build())
        }

        #[cfg(not(feature = "kafka"))]
        {
            tracing::error!(
                broker = %config.queue.broker_address,
                topic = %config.queue.topic,
                "Queue sink configured but this build lacks the `kafka` feature"
            );
            Err(SinkError::Unsupported("queue sink (rebuild with `--features kafka`)"))
        }
    }

    /// Handle for the request path.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub async fn publish(&self, event: LogEvent) -> usize {
        self.dispatcher.publish(event).await
    }

    pub fn sinks(&self) -> &[SinkHandle] {
        self.dispatcher.sinks()
    }

    /// Flush every sink in registration order, then signal the listener.
    pub async fn shutdown(self, listener: &Shutdown) -> ShutdownReport {
        let report = self.coordinator.run().await;
        listener.trigger();
        report
    }
}
