//! Fan-out of log events to every sink.

use std::sync::Arc;

use crate::config::BackpressurePolicy;
use crate::event::LogEvent;
use crate::observability::metrics;
use crate::pipeline::worker::{EnqueueOutcome, SinkHandle};

/// Publishes events to all registered sink buffers.
///
/// Cheap to clone; every clone feeds the same buffers.
#[derive(Clone)]
pub struct Dispatcher {
    sinks: Arc<[SinkHandle]>,
    policy: BackpressurePolicy,
}

impl Dispatcher {
    pub(crate) fn new(sinks: Vec<SinkHandle>, policy: BackpressurePolicy) -> Self {
        Self {
            sinks: sinks.into(),
            policy,
        }
    }

    /// Offer `event` to every sink, in registration order.
    ///
    /// Under [`BackpressurePolicy::Block`] this suspends until each buffer has
    /// room, so a saturated sink slows the caller instead of losing events.
    /// Returns the number of sinks that accepted the event.
    pub async fn publish(&self, event: LogEvent) -> usize {
        let event = Arc::new(event);
        let mut accepted = 0;
        for sink in self.sinks.iter() {
            if sink.enqueue(Arc::clone(&event), self.policy).await == EnqueueOutcome::Accepted {
                accepted += 1;
            }
        }
        metrics::record_event_published();
        accepted
    }

    pub fn sinks(&self) -> &[SinkHandle] {
        &self.sinks
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }
}
