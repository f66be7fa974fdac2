//! Builds a [`LogEvent`] from a finished trace context.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::event::types::{LogEvent, TraceDeltas};
use crate::trace::{Phase, TraceContext};

impl TraceDeltas {
    /// Derive the five latency deltas from recorded phases.
    pub fn from_trace(trace: &TraceContext) -> Self {
        Self {
            dns_delta: trace.delta_ms(Phase::DnsStart, Phase::DnsDone),
            dial_delta: trace.delta_ms(Phase::DialStart, Phase::DialDone),
            tls_handshake_delta: trace.delta_ms(Phase::TlsStart, Phase::TlsDone),
            connect_delta: trace.delta_ms(Phase::GetConnection, Phase::GotConnection),
            first_response_delta: trace.delta_ms(Phase::GotConnection, Phase::FirstResponseByte),
        }
    }
}

impl LogEvent {
    /// Assemble the event for a completed response.
    ///
    /// The timestamp is the wall clock at build time, not any recorded phase.
    pub fn build(
        name: &str,
        url: impl Into<String>,
        method: impl Into<String>,
        status: u16,
        trace: &TraceContext,
    ) -> Self {
        Self {
            name: name.to_string(),
            timestamp: epoch_millis(),
            url: url.into(),
            method: method.into(),
            status,
            trace: TraceDeltas::from_trace(trace),
        }
    }
}

fn epoch_millis() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
