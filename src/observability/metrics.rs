//! Metrics collection and exposition.
//!
//! # Metrics
//! - `trace_proxy_events_published_total` (counter)
//! - `trace_proxy_events_dropped_total` (counter): by sink, reason
//! - `trace_proxy_sink_deliveries_total` (counter): by sink, outcome
//! - `trace_proxy_sink_buffer_depth` (gauge): by sink
//! - `trace_proxy_phase_latency_ms` (histogram): by phase
//!
//! Recording without an installed exporter is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::event::TraceDeltas;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event_published() {
    counter!("trace_proxy_events_published_total").increment(1);
}

pub fn record_event_dropped(sink: &str, reason: &'static str) {
    counter!("trace_proxy_events_dropped_total", "sink" => sink.to_string(), "reason" => reason)
        .increment(1);
}

pub fn record_events_lost(sink: &str, count: u64) {
    counter!("trace_proxy_events_dropped_total", "sink" => sink.to_string(), "reason" => "shutdown")
        .increment(count);
}

pub fn record_delivery(sink: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("trace_proxy_sink_deliveries_total", "sink" => sink.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_buffer_depth(sink: &str, depth: usize) {
    gauge!("trace_proxy_sink_buffer_depth", "sink" => sink.to_string()).set(depth as f64);
}

pub fn record_trace(deltas: &TraceDeltas) {
    let phases = [
        ("dns", deltas.dns_delta),
        ("dial", deltas.dial_delta),
        ("tls_handshake", deltas.tls_handshake_delta),
        ("connect", deltas.connect_delta),
        ("first_response", deltas.first_response_delta),
    ];
    for (phase, ms) in phases {
        histogram!("trace_proxy_phase_latency_ms", "phase" => phase).record(ms as f64);
    }
}
