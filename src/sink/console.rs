//! Console sink: one JSON object per line.

use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::event::LogEvent;
use crate::sink::{Sink, SinkError};

/// Writes each event as a JSON line to `W`.
pub struct ConsoleSink<W> {
    writer: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    /// Console sink writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W: Write + Send> Sink for ConsoleSink<W> {
    async fn deliver(&self, event: &LogEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().expect("console writer mutex poisoned");
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        // Every line is written through in deliver.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TraceDeltas;
    use std::sync::Arc;

    /// Writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn event(status: u16) -> LogEvent {
        LogEvent {
            name: "edge".into(),
            timestamp: 1_700_000_000_123,
            url: "https://x".into(),
            method: "GET".into(),
            status,
            trace: TraceDeltas {
                dns_delta: 3,
                dial_delta: 7,
                tls_handshake_delta: 21,
                connect_delta: 31,
                first_response_delta: 12,
            },
        }
    }

    #[tokio::test]
    async fn emits_json_line_that_round_trips() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        sink.deliver(&event(200)).await.unwrap();

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(output.ends_with('\n'));
        assert_eq!(output.lines().count(), 1);

        let decoded: LogEvent = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(decoded, event(200));
    }

    #[tokio::test]
    async fn one_line_per_event() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        sink.deliver(&event(200)).await.unwrap();
        sink.deliver(&event(404)).await.unwrap();
        sink.flush().await.unwrap();

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let statuses: Vec<u16> = output
            .lines()
            .map(|line| serde_json::from_str::<LogEvent>(line).unwrap().status)
            .collect();
        assert_eq!(statuses, vec![200, 404]);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_failure_is_io_error() {
        let sink = ConsoleSink::new(BrokenPipe);
        let err = sink.deliver(&event(200)).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
