//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the tracing proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Source name stamped on every log event.
    pub name: String,

    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Event buffering and shutdown drain settings.
    pub pipeline: PipelineConfig,

    /// Durable message-queue sink.
    pub queue: QueueSinkConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: "proxy".to_string(),
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            pipeline: PipelineConfig::default(),
            queue: QueueSinkConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3210").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3210".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream DNS / dial / TLS timeout, per step, in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for the listener to close after sinks are flushed.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// What `publish` does when a sink buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Suspend the publisher until the sink frees a slot. Never drops.
    #[default]
    Block,

    /// Wait up to `wait_ms`, then drop the event for that sink and count it.
    DropAfter { wait_ms: u64 },
}

/// Event pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of each sink's event buffer.
    pub buffer_capacity: usize,

    /// Maximum time to wait for a sink buffer to empty on shutdown.
    pub drain_timeout_ms: u64,

    /// Full-buffer behavior of the dispatcher.
    pub backpressure: BackpressurePolicy,
}

impl PipelineConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            drain_timeout_ms: 10_000,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

/// Durable message-queue sink configuration.
///
/// The sink is only constructed when both `broker_address` and `topic` are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueSinkConfig {
    /// Broker bootstrap address (e.g., "localhost:9092").
    pub broker_address: String,

    /// Topic events are produced to.
    pub topic: String,

    /// Maximum messages per producer batch.
    pub batch_size: usize,

    /// Maximum bytes per producer batch.
    pub batch_bytes: usize,

    /// How long the producer lingers to fill a batch, in milliseconds.
    pub linger_ms: u64,

    /// Enqueue without waiting for broker acknowledgement.
    pub async_delivery: bool,

    /// How long the producer keeps retrying a message before reporting it
    /// failed, in milliseconds.
    pub delivery_timeout_ms: u64,

    /// Maximum time `flush` waits for pending messages before closing.
    pub flush_timeout_ms: u64,
}

impl QueueSinkConfig {
    /// Whether the durable sink should be created.
    pub fn is_enabled(&self) -> bool {
        !self.broker_address.trim().is_empty() && !self.topic.trim().is_empty()
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

impl Default for QueueSinkConfig {
    fn default() -> Self {
        Self {
            broker_address: String::new(),
            topic: String::new(),
            batch_size: 100,
            batch_bytes: 10 * 1024 * 1024, // 10MB
            linger_ms: 1_000,
            async_delivery: true,
            delivery_timeout_ms: 10_000,
            flush_timeout_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
