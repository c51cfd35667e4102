//! Event sink that collects everything it receives.

use dbchat_protocol::{EventMsg, EventPayload, EventSink};
use parking_lot::Mutex;

/// [`EventSink`] storing events for later assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EventMsg>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event received, in order.
    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }

    /// Payloads only, in order.
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events
            .lock()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
