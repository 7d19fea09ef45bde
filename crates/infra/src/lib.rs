//! Infrastructure layer: storage, gateway adapters, notifications and the
//! services that orchestrate them.

pub mod cart_store;
pub mod catalog;
pub mod gateway;
pub mod locks;
pub mod notify;
pub mod publish;
pub mod services;
pub mod store;
pub mod workers;

pub use catalog::InMemoryCatalog;
pub use locks::OwnerLocks;
pub use publish::{BusMessage, EventPublisher};
