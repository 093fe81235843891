//! Entity base
//!
//! Entities record events while a handler mutates them. The message bus
//! drains the buffer exactly once after the command handler returns.

use std::fmt;
use std::sync::Arc;

use super::message::Event;

/// Ordered buffer of recorded-but-undispatched events
#[derive(Clone, Default)]
pub struct EventBuffer {
    events: Vec<Arc<dyn Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; emission order is preserved
    pub fn record<E: Event>(&mut self, event: E) {
        self.events.push(Arc::new(event));
    }

    /// Take every pending event, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<Arc<dyn Event>> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Names of the pending events, in emission order
    pub fn names(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.name()).collect()
    }
}

impl fmt::Debug for EventBuffer {
    // Events may carry secrets (OtpIssued holds the plaintext code)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Entity trait that every aggregate returned from a command implements
pub trait Entity: Send + 'static {
    /// Pending events
    fn events(&self) -> &EventBuffer;

    /// Mutable access to pending events
    fn events_mut(&mut self) -> &mut EventBuffer;

    /// Record an event to be dispatched after the command completes
    fn record_event<E: Event>(&mut self, event: E)
    where
        Self: Sized,
    {
        self.events_mut().record(event);
    }

    /// Drain pending events
    fn take_events(&mut self) -> Vec<Arc<dyn Event>> {
        self.events_mut().drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OtpIssued;

    #[test]
    fn test_drain_preserves_order_and_empties_buffer() {
        let mut buffer = EventBuffer::new();
        buffer.record(OtpIssued::new(1, "1111".to_string()));
        buffer.record(OtpIssued::new(2, "2222".to_string()));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());

        let first = drained[0].as_any().downcast_ref::<OtpIssued>().unwrap();
        let second = drained[1].as_any().downcast_ref::<OtpIssued>().unwrap();
        assert_eq!(first.otp_id, 1);
        assert_eq!(second.otp_id, 2);

        // Draining again yields nothing
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_debug_hides_event_payloads() {
        let mut buffer = EventBuffer::new();
        buffer.record(OtpIssued::new(7, "9876".to_string()));

        let rendered = format!("{:?}", buffer);
        assert!(rendered.contains("OtpIssued"));
        assert!(!rendered.contains("9876"));
    }
}
