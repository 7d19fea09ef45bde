//! Background workers fed by the event bus.

pub mod notification_worker;

pub use notification_worker::{NotificationHandler, NotificationWorker, WorkerHandle};
