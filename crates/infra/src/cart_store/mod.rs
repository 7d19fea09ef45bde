//! Cart storage.
//!
//! One contract, two backings: anonymous carts are serialized into the
//! shopper's session, customer carts are rows keyed by `(cart, line key)`.
//! `CartService` picks the backing by owner kind; nothing above it branches
//! on where a cart lives.

pub mod persistent;
pub mod session;

use std::sync::Arc;

use storefront_cart::{CartLine, CartOwner, LineKey};

use crate::store::StoreError;

pub use persistent::PersistentCartStore;
pub use session::SessionCartStore;

pub trait CartStore: Send + Sync {
    /// Current lines, in the order they were first added.
    fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, StoreError>;

    /// Increment the line with this key, or insert it.
    fn add(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError>;

    /// Set a line's quantity; `0` deletes it. Missing lines are left alone.
    fn set_quantity(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError>;

    /// Delete a line. Idempotent.
    fn remove(&self, owner: &CartOwner, key: &LineKey) -> Result<(), StoreError>;

    fn clear(&self, owner: &CartOwner) -> Result<(), StoreError>;

    /// Put lines back after an aborted checkout, adding to whatever the
    /// shopper placed in the cart meanwhile.
    fn restore(&self, owner: &CartOwner, lines: &[CartLine]) -> Result<(), StoreError> {
        for line in lines {
            self.add(owner, &line.key, line.quantity)?;
        }
        Ok(())
    }
}

impl<S> CartStore for Arc<S>
where
    S: CartStore + ?Sized,
{
    fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, StoreError> {
        (**self).lines(owner)
    }

    fn add(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        (**self).add(owner, key, quantity)
    }

    fn set_quantity(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        (**self).set_quantity(owner, key, quantity)
    }

    fn remove(&self, owner: &CartOwner, key: &LineKey) -> Result<(), StoreError> {
        (**self).remove(owner, key)
    }

    fn clear(&self, owner: &CartOwner) -> Result<(), StoreError> {
        (**self).clear(owner)
    }

    fn restore(&self, owner: &CartOwner, lines: &[CartLine]) -> Result<(), StoreError> {
        (**self).restore(owner, lines)
    }
}
