//! In-process publish/subscribe of order lifecycle events.

use copytrade_core::types::OrderEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Process-local event bus. Subscribers that fall behind lose old events
/// (broadcast semantics); publishing never blocks.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; a send with no subscribers is not an error.
    pub fn publish(&self, event: OrderEvent) {
        debug!(
            kind = ?event.kind,
            order_id = %event.order_id,
            strategy_id = %event.strategy_id,
            "Publishing order event"
        );
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
