//! The bounded replay buffer for late-joining subscribers (§4.10 "replay
//! buffer", §8 property 8).

use std::collections::VecDeque;

use parking_lot::Mutex;
use stratum_core::EventEnvelope;

use crate::session::Filter;

/// FIFO buffer of the most recent `recent_events_capacity` workflow events
/// (§4.1, §4.10), across every workflow. `stratum-api` keeps one of these
/// per process; sessions replay a filtered view of the same buffer rather
/// than each holding their own copy.
pub struct ReplayBuffer {
    capacity: usize,
    events: Mutex<VecDeque<EventEnvelope>>,
}

impl ReplayBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append `event`, evicting the oldest entry once over capacity.
    pub fn push(&self, event: EventEnvelope) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Every buffered event whose payload matches `filter`, oldest first —
    /// "in the order they were accepted by the bus" (§8 property 8).
    #[must_use]
    pub fn matching(&self, filter: &Filter) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
