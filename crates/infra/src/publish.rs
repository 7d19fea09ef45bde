use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use storefront_core::AggregateId;
use storefront_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};

/// What travels on the bus.
pub type BusMessage = EventEnvelope<serde_json::Value>;

/// Publishes committed events. Failures are logged and never undo the
/// commit that produced the event.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: Arc<InMemoryEventBus<BusMessage>>,
}

impl EventPublisher {
    pub fn new(bus: Arc<InMemoryEventBus<BusMessage>>) -> Self {
        Self { bus }
    }

    pub fn subscribe(&self) -> Subscription<BusMessage> {
        self.bus.subscribe()
    }

    /// Publish `events` that moved an aggregate from `base_version`; event
    /// `i` gets sequence number `base_version + i + 1`.
    pub fn publish_all<E>(&self, aggregate_id: AggregateId, aggregate_type: &str, base_version: u64, events: &[E])
    where
        E: Event + Serialize,
    {
        for (i, event) in events.iter().enumerate() {
            let sequence = base_version + i as u64 + 1;
            let envelope = match EventEnvelope::from_typed(aggregate_id, aggregate_type, sequence, event) {
                Ok(env) => env,
                Err(e) => {
                    warn!(event_type = event.event_type(), error = %e, "failed to encode event");
                    continue;
                }
            };
            if let Err(e) = self.bus.publish(envelope) {
                warn!(event_type = event.event_type(), error = ?e, "failed to publish event");
            }
        }
    }
}
