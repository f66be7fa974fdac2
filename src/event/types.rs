//! Log event wire types.
//!
//! Serialized as:
//! ```text
//! {"name":..,"timestamp":..,"url":..,"method":..,"status":..,
//!  "trace":{"dnsDelta":..,"dialDelta":..,"tlsHandshakeDelta":..,
//!           "connectDelta":..,"firstResponseDelta":..}}
//! ```

use serde::{Deserialize, Serialize};

/// Summary of one proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Source name assigned to this proxy instance.
    pub name: String,

    /// Completion time, milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Full upstream URL.
    pub url: String,

    pub method: String,

    pub status: u16,

    pub trace: TraceDeltas,
}

/// Per-phase latency breakdown in milliseconds.
///
/// Zero means either a zero-length phase or a phase that was not measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDeltas {
    pub dns_delta: i64,
    pub dial_delta: i64,
    pub tls_handshake_delta: i64,
    pub connect_delta: i64,
    pub first_response_delta: i64,
}
