//! Shared utilities for integration testing.
#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use trace_proxy::config::PipelineConfig;
use trace_proxy::event::{LogEvent, TraceDeltas};
use trace_proxy::sink::{MessageProducer, ProducerStats, Sink, SinkError};

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn pipeline_config(capacity: usize) -> PipelineConfig {
    PipelineConfig {
        buffer_capacity: capacity,
        drain_timeout_ms: 2_000,
        ..PipelineConfig::default()
    }
}

pub fn event(n: i64) -> LogEvent {
    LogEvent {
        name: "test".into(),
        timestamp: n,
        url: format!("http://127.0.0.1/{}", n),
        method: "GET".into(),
        status: 200,
        trace: TraceDeltas::default(),
    }
}

/// In-memory writer for the console sink.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.lines()
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a [`CaptureSink`] saw, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deliver(i64),
    Flush,
}

/// Records deliveries and flushes. Optionally gated or slow.
pub struct CaptureSink {
    calls: Mutex<Vec<Call>>,
    events: Mutex<Vec<LogEvent>>,
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
    flush_delay: Duration,
    flush_timeout: Duration,
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            gate: None,
            delay: Duration::ZERO,
            flush_delay: Duration::ZERO,
            flush_timeout: Duration::from_secs(5),
        }
    }
}

impl CaptureSink {
    /// Each delivery waits for one permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let sink = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (sink, gate)
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Flush that outlives its own timeout.
    pub fn hanging_flush(flush_timeout: Duration) -> Self {
        Self {
            flush_delay: flush_timeout * 20,
            flush_timeout,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.events().iter().map(|e| e.timestamp).collect()
    }
}

#[async_trait]
impl Sink for CaptureSink {
    async fn deliver(&self, event: &LogEvent) -> Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push(Call::Deliver(event.timestamp));
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        if !self.flush_delay.is_zero() {
            tokio::time::sleep(self.flush_delay).await;
        }
        self.calls.lock().unwrap().push(Call::Flush);
        Ok(())
    }

    fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }
}

/// Producer recording keyed messages; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingProducer {
    messages: Arc<Mutex<Vec<(Vec<u8>, Vec<u8>)>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingProducer {
    pub fn messages(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProducer for RecordingProducer {
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), SinkError> {
        self.messages
            .lock()
            .unwrap()
            .push((key.to_vec(), payload.to_vec()));
        Ok(())
    }

    fn stats(&self) -> ProducerStats {
        ProducerStats::default()
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Producer whose sends wait for a permit and which never reports idle.
pub struct BusyProducer {
    gate: Arc<Semaphore>,
    sent: AtomicUsize,
    closes: AtomicUsize,
}

impl BusyProducer {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let producer = Self {
            gate: Arc::clone(&gate),
            sent: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        };
        (producer, gate)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProducer for BusyProducer {
    async fn send(&self, _key: &[u8], _payload: &[u8]) -> Result<(), SinkError> {
        self.gate.acquire().await.unwrap().forget();
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> ProducerStats {
        ProducerStats {
            pending_messages: 0,
            pending_writes: 1,
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
