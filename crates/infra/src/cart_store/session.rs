use std::collections::HashMap;
use std::sync::RwLock;

use storefront_cart::{CartLine, CartOwner, LineKey, SessionCart};
use storefront_core::SessionId;

use super::CartStore;
use crate::store::StoreError;

/// Session-backed carts: one JSON blob per anonymous session, the same shape
/// a cookie or cache session backend would hold.
#[derive(Debug, Default)]
pub struct SessionCartStore {
    sessions: RwLock<HashMap<SessionId, Vec<u8>>>,
}

impl SessionCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_id(owner: &CartOwner) -> Result<SessionId, StoreError> {
        match owner {
            CartOwner::Session(id) => Ok(*id),
            other => Err(StoreError::UnsupportedOwner(other.to_string())),
        }
    }

    fn load(&self, id: SessionId) -> Result<SessionCart, StoreError> {
        let sessions = self.sessions.read().map_err(|_| StoreError::Poisoned)?;
        match sessions.get(&id) {
            Some(blob) => SessionCart::from_json(blob).map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(SessionCart::default()),
        }
    }

    /// Read-modify-write under the write lock.
    fn modify<F>(&self, owner: &CartOwner, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SessionCart),
    {
        let id = Self::session_id(owner)?;
        let mut sessions = self.sessions.write().map_err(|_| StoreError::Poisoned)?;
        let mut cart = match sessions.get(&id) {
            Some(blob) => SessionCart::from_json(blob).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            None => SessionCart::default(),
        };
        f(&mut cart);
        if cart.is_empty() {
            sessions.remove(&id);
        } else {
            let blob = cart.to_json().map_err(|e| StoreError::Corrupt(e.to_string()))?;
            sessions.insert(id, blob);
        }
        Ok(())
    }
}

impl CartStore for SessionCartStore {
    fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, StoreError> {
        let id = Self::session_id(owner)?;
        Ok(self.load(id)?.lines())
    }

    fn add(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        self.modify(owner, |cart| cart.add(key, quantity))
    }

    fn set_quantity(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        self.modify(owner, |cart| cart.set_quantity(key, quantity))
    }

    fn remove(&self, owner: &CartOwner, key: &LineKey) -> Result<(), StoreError> {
        self.modify(owner, |cart| cart.remove(key))
    }

    fn clear(&self, owner: &CartOwner) -> Result<(), StoreError> {
        self.modify(owner, SessionCart::clear)
    }
}
