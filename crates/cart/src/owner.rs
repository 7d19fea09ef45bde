use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, SessionId};

/// Whoever a cart belongs to.
///
/// Anonymous shoppers keep their cart in the session; authenticated
/// customers have a persistent cart.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    Session(SessionId),
    Customer(CustomerId),
}

impl CartOwner {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, CartOwner::Customer(_))
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            CartOwner::Customer(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }
}

impl core::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CartOwner::Session(id) => write!(f, "session:{id}"),
            CartOwner::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}
