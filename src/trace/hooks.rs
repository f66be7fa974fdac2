//! Phase hook set invoked by the transport.
//!
//! The transport calls one named hook at each lifecycle instant. Hooks must
//! not block or fail; the default implementations only record a timestamp.

use std::time::Instant;

use crate::trace::context::{Phase, TraceContext};

/// Callbacks fired by the transport as a request progresses.
///
/// Implementors supply [`PhaseHooks::on_phase`]; the named hooks delegate to it.
pub trait PhaseHooks {
    /// Called for every phase transition.
    fn on_phase(&mut self, phase: Phase);

    /// Called when the transport observed the instant itself, after the fact.
    fn on_phase_at(&mut self, phase: Phase, at: Instant) {
        let _ = at;
        self.on_phase(phase);
    }

    fn dns_start(&mut self) {
        self.on_phase(Phase::DnsStart);
    }

    fn dns_done(&mut self) {
        self.on_phase(Phase::DnsDone);
    }

    fn dial_start(&mut self) {
        self.on_phase(Phase::DialStart);
    }

    fn dial_done(&mut self) {
        self.on_phase(Phase::DialDone);
    }

    fn tls_start(&mut self) {
        self.on_phase(Phase::TlsStart);
    }

    fn tls_done(&mut self) {
        self.on_phase(Phase::TlsDone);
    }

    fn get_conn(&mut self) {
        self.on_phase(Phase::GetConnection);
    }

    fn got_conn(&mut self) {
        self.on_phase(Phase::GotConnection);
    }

    fn first_response_byte(&mut self) {
        self.on_phase(Phase::FirstResponseByte);
    }

    fn first_response_byte_at(&mut self, at: Instant) {
        self.on_phase_at(Phase::FirstResponseByte, at);
    }
}

impl PhaseHooks for TraceContext {
    fn on_phase(&mut self, phase: Phase) {
        self.record(phase);
    }

    fn on_phase_at(&mut self, phase: Phase, at: Instant) {
        self.record_at(phase, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<Phase>);

    impl PhaseHooks for Recorder {
        fn on_phase(&mut self, phase: Phase) {
            self.0.push(phase);
        }
    }

    #[test]
    fn named_hooks_map_to_phases() {
        let mut rec = Recorder::default();
        rec.dns_start();
        rec.dns_done();
        rec.dial_start();
        rec.dial_done();
        rec.tls_start();
        rec.tls_done();
        rec.get_conn();
        rec.got_conn();
        rec.first_response_byte();
        assert_eq!(rec.0, Phase::ALL.to_vec());
    }

    #[test]
    fn trace_context_records_through_hooks() {
        let mut ctx = TraceContext::begin();
        ctx.get_conn();
        ctx.got_conn();
        assert!(ctx.get(Phase::GetConnection).is_some());
        assert!(ctx.get(Phase::GotConnection).is_some());
        assert!(ctx.get(Phase::DnsStart).is_none());
    }

    #[test]
    fn observed_instant_is_kept() {
        let mut ctx = TraceContext::begin();
        let earlier = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        ctx.got_conn();
        ctx.first_response_byte_at(earlier);
        assert_eq!(ctx.get(Phase::FirstResponseByte), Some(earlier));

        let mut rec = Recorder::default();
        rec.first_response_byte_at(earlier);
        assert_eq!(rec.0, vec![Phase::FirstResponseByte]);
    }
}
