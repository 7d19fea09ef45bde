use chrono::{DateTime, Utc};

/// A committed domain fact.
///
/// Events are immutable, versioned, and only ever emitted for a real state
/// change. A command replayed against an aggregate that already recorded its
/// outcome emits nothing, so consumers see each transition once per commit.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "payments.payment.completed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
