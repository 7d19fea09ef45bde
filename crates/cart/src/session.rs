//! Session cart blob.
//!
//! Anonymous carts live inside the shopper's session as a map from encoded
//! line key to entry, serialized as JSON by the session backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use storefront_catalog::{ProductId, VariationId};

use crate::line::{CartLine, LineKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub variation_ids: Vec<VariationId>,
    /// Insertion position; lines are listed in the order first added.
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCart {
    entries: BTreeMap<String, SessionEntry>,
}

impl SessionCart {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines in the order they were first added. Entries with a zero quantity
    /// are never stored, but a hand-edited blob could carry one; those are
    /// dropped here.
    pub fn lines(&self) -> Vec<CartLine> {
        let mut entries: Vec<&SessionEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .filter_map(|e| {
                CartLine::new(LineKey::new(e.product_id, e.variation_ids.iter().copied()), e.quantity).ok()
            })
            .collect()
    }

    /// Increment an existing line or insert a new one.
    pub fn add(&mut self, key: &LineKey, quantity: u32) {
        let seq = self.next_seq();
        self.entries
            .entry(key.encode())
            .and_modify(|e| e.quantity = e.quantity.saturating_add(quantity))
            .or_insert_with(|| SessionEntry {
                product_id: key.product_id(),
                quantity,
                variation_ids: key.variation_ids().to_vec(),
                seq,
            });
    }

    fn next_seq(&self) -> u64 {
        self.entries.values().map(|e| e.seq + 1).max().unwrap_or(0)
    }

    /// Set a line's quantity; `0` removes it. Unknown keys are ignored.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: u32) {
        if quantity == 0 {
            self.remove(key);
        } else if let Some(e) = self.entries.get_mut(&key.encode()) {
            e.quantity = quantity;
        }
    }

    pub fn remove(&mut self, key: &LineKey) {
        self.entries.remove(&key.encode());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::AggregateId;

    fn key(variations: usize) -> LineKey {
        LineKey::new(
            ProductId::new(AggregateId::new()),
            (0..variations).map(|_| VariationId::new(AggregateId::new())),
        )
    }

    #[test]
    fn add_increments_existing_line() {
        let mut cart = SessionCart::default();
        let k = key(2);
        cart.add(&k, 1);
        cart.add(&k, 2);
        let lines = cart.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].key, k);
    }

    #[test]
    fn set_zero_removes_and_remove_is_idempotent() {
        let mut cart = SessionCart::default();
        let k = key(0);
        cart.add(&k, 4);
        cart.set_quantity(&k, 7);
        assert_eq!(cart.lines()[0].quantity, 7);
        cart.set_quantity(&k, 0);
        assert!(cart.is_empty());
        cart.remove(&k);
        assert!(cart.is_empty());
    }

    #[test]
    fn lines_keep_insertion_order() {
        let keys: Vec<LineKey> = (0..6).map(|_| key(1)).collect();
        let mut cart = SessionCart::default();
        for k in keys.iter().rev() {
            cart.add(k, 1);
        }
        // Re-adding an existing line keeps its place.
        cart.add(&keys[5], 2);
        cart.remove(&keys[2]);
        cart.add(&keys[2], 1);

        let listed: Vec<LineKey> = cart.lines().into_iter().map(|l| l.key).collect();
        let expected: Vec<LineKey> = [5, 4, 3, 1, 0, 2].iter().map(|i| keys[*i].clone()).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn blob_survives_json() {
        let mut cart = SessionCart::default();
        cart.add(&key(1), 2);
        cart.add(&key(0), 1);
        let bytes = cart.to_json().unwrap();
        assert_eq!(SessionCart::from_json(&bytes).unwrap(), cart);
    }
}
