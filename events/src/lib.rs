//! Replaces the "global event bus" anti-pattern (§9 Design Notes: "replace
//! the process-wide subscriber list with an explicit channel owned by the
//! metrics collector; publishers send into the channel; one consumer drains
//! it"). `EventBus` is that explicit channel: a thin, cloneable wrapper
//! around a `tokio::sync::broadcast` sender, constructed once at startup and
//! handed by value to every component that needs to publish or subscribe —
//! never reached through global/static state.

use cellbox_protocol::Event;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Best-effort: if there are no subscribers the event is simply dropped,
    /// matching a pub/sub bus rather than a durable queue.
    pub fn publish(&self, event: Event) {
        trace!(?event, "publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellbox_protocol::{Language, SessionId};

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::PoolExhausted {
            language: Language::Py,
            session_id: SessionId::new(),
        });

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::PoolWarmedUp {
            language: Language::Py,
            count: 3,
        });
    }
}
