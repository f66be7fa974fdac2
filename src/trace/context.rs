//! Trace context: phase timestamps for a single request.

use std::fmt;
use std::time::{Duration, Instant};

/// A named instant in a request's network lifecycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    DnsStart = 0,
    DnsDone = 1,
    DialStart = 2,
    DialDone = 3,
    TlsStart = 4,
    TlsDone = 5,
    GetConnection = 6,
    GotConnection = 7,
    FirstResponseByte = 8,
}

impl Phase {
    /// Every phase, in lifecycle order.
    pub const ALL: [Phase; 9] = [
        Phase::DnsStart,
        Phase::DnsDone,
        Phase::DialStart,
        Phase::DialDone,
        Phase::TlsStart,
        Phase::TlsDone,
        Phase::GetConnection,
        Phase::GotConnection,
        Phase::FirstResponseByte,
    ];

    /// Stable snake_case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DnsStart => "dns_start",
            Phase::DnsDone => "dns_done",
            Phase::DialStart => "dial_start",
            Phase::DialDone => "dial_done",
            Phase::TlsStart => "tls_start",
            Phase::TlsDone => "tls_done",
            Phase::GetConnection => "get_connection",
            Phase::GotConnection => "got_connection",
            Phase::FirstResponseByte => "first_response_byte",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamps recorded for one in-flight request.
///
/// Slots are indexed by [`Phase`] discriminant. An unrecorded phase is `None`.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    stamps: [Option<Instant>; 9],
}

impl TraceContext {
    /// Start tracing a new request.
    pub fn begin() -> Self {
        Self::default()
    }

    /// Record `Instant::now()` for `phase`, replacing any earlier value.
    pub fn record(&mut self, phase: Phase) {
        self.record_at(phase, Instant::now());
    }

    /// Record an explicit instant for `phase`, replacing any earlier value.
    pub fn record_at(&mut self, phase: Phase, at: Instant) {
        self.stamps[phase as usize] = Some(at);
    }

    /// Timestamp recorded for `phase`, if any.
    pub fn get(&self, phase: Phase) -> Option<Instant> {
        self.stamps[phase as usize]
    }

    /// Milliseconds between `start` and `done`.
    ///
    /// Returns 0 unless both phases were recorded. Negative when `done` was
    /// recorded before `start` (a phase that fired again after completing).
    pub fn delta_ms(&self, start: Phase, done: Phase) -> i64 {
        match (self.get(start), self.get(done)) {
            (Some(start), Some(done)) => signed_millis(start, done),
            _ => 0,
        }
    }
}

fn signed_millis(start: Instant, done: Instant) -> i64 {
    match done.checked_duration_since(start) {
        Some(elapsed) => millis(elapsed),
        None => -millis(start.duration_since(done)),
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
