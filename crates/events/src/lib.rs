//! Domain events and the bus that carries them to side-effect workers.
//!
//! Orders and payments emit typed events when a transition is committed.
//! Infrastructure wraps them in an [`EventEnvelope`] and publishes them on an
//! [`EventBus`]; workers (notifications) consume them off the request path.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
