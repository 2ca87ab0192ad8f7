//! Event fan-out to indexers
//!
//! Events are published synchronously with the write that caused them, once
//! per successful call. Publishing never fails the write: a broadcast channel
//! with no subscribers simply drops the envelope.

use crate::types::EventEnvelope;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Receives committed ledger events
pub trait EventSink: Send + Sync {
    /// Publish one envelope
    fn publish(&self, envelope: EventEnvelope);
}

/// Broadcast sink backing `Ledger::subscribe`
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastSink {
    /// Create with a bounded buffer; slow subscribers observe `Lagged`
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe from the next published event onwards
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`
    pub fn stream(&self) -> BroadcastStream<EventEnvelope> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, envelope: EventEnvelope) {
        if self.sender.send(envelope).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

/// Sink that records every envelope, for tests and replay
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemorySink {
    /// Create empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().clone()
    }

    /// Number of published envelopes
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing has been published
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, envelope: EventEnvelope) {
        self.events.lock().push(envelope);
    }
}
