//! Order and payment persistence.
//!
//! Updates are conditional on the aggregate version the caller loaded, so
//! two settlement paths racing on the same payment cannot lose a write: the
//! loser gets [`StoreError::Conflict`], reloads and decides again.

pub mod orders;
pub mod payments;

use thiserror::Error;

pub use orders::{InMemoryOrderStore, OrderStore};
pub use payments::{InMemoryPaymentStore, PaymentStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Stale version on a conditional update.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    /// A uniqueness constraint was violated.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The store does not hold carts for this kind of owner.
    #[error("unsupported cart owner: {0}")]
    UnsupportedOwner(String),

    #[error("storage lock poisoned")]
    Poisoned,
}
