use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use storefront_cart::{CartLine, CartOwner, LineKey};
use storefront_core::{AggregateId, CustomerId};

use super::CartStore;
use crate::store::StoreError;

#[derive(Debug, Clone)]
struct CartRow {
    id: AggregateId,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ItemRow {
    quantity: u32,
    added_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    carts: HashMap<CustomerId, CartRow>,
    /// Unique on `(cart, line key)`.
    items: BTreeMap<(AggregateId, LineKey), ItemRow>,
    next_seq: u64,
}

impl Tables {
    /// Look up or create the customer's cart row.
    fn cart_for(&mut self, customer: CustomerId) -> AggregateId {
        self.carts
            .entry(customer)
            .or_insert_with(|| CartRow {
                id: AggregateId::new(),
                created_at: Utc::now(),
            })
            .id
    }

    fn existing_cart(&self, customer: CustomerId) -> Option<AggregateId> {
        self.carts.get(&customer).map(|c| c.id)
    }
}

/// Customer carts as rows: one cart per customer, one item row per line key.
#[derive(Debug, Default)]
pub struct PersistentCartStore {
    inner: RwLock<Tables>,
}

impl PersistentCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn customer_id(owner: &CartOwner) -> Result<CustomerId, StoreError> {
        match owner {
            CartOwner::Customer(id) => Ok(*id),
            other => Err(StoreError::UnsupportedOwner(other.to_string())),
        }
    }

    /// When the customer's cart row was created, if it exists.
    pub fn cart_created_at(&self, customer: CustomerId) -> Option<DateTime<Utc>> {
        let t = self.inner.read().ok()?;
        t.carts.get(&customer).map(|c| c.created_at)
    }
}

impl CartStore for PersistentCartStore {
    fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, StoreError> {
        let customer = Self::customer_id(owner)?;
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let Some(cart) = t.existing_cart(customer) else {
            return Ok(vec![]);
        };

        let mut rows: Vec<(&LineKey, &ItemRow)> = t
            .items
            .iter()
            .filter(|((c, _), _)| *c == cart)
            .map(|((_, k), row)| (k, row))
            .collect();
        rows.sort_by_key(|(_, row)| (row.added_at, row.seq));

        Ok(rows
            .into_iter()
            .filter_map(|(k, row)| CartLine::new(k.clone(), row.quantity).ok())
            .collect())
    }

    fn add(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        let customer = Self::customer_id(owner)?;
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let cart = t.cart_for(customer);
        t.next_seq += 1;
        let seq = t.next_seq;

        t.items
            .entry((cart, key.clone()))
            .and_modify(|row| row.quantity = row.quantity.saturating_add(quantity))
            .or_insert_with(|| ItemRow {
                quantity,
                added_at: Utc::now(),
                seq,
            });
        Ok(())
    }

    fn set_quantity(&self, owner: &CartOwner, key: &LineKey, quantity: u32) -> Result<(), StoreError> {
        let customer = Self::customer_id(owner)?;
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let Some(cart) = t.existing_cart(customer) else {
            return Ok(());
        };
        let row_key = (cart, key.clone());

        if quantity == 0 {
            t.items.remove(&row_key);
        } else if let Some(row) = t.items.get_mut(&row_key) {
            row.quantity = quantity;
        }
        Ok(())
    }

    fn remove(&self, owner: &CartOwner, key: &LineKey) -> Result<(), StoreError> {
        let customer = Self::customer_id(owner)?;
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(cart) = t.existing_cart(customer) {
            t.items.remove(&(cart, key.clone()));
        }
        Ok(())
    }

    fn clear(&self, owner: &CartOwner) -> Result<(), StoreError> {
        let customer = Self::customer_id(owner)?;
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(cart) = t.existing_cart(customer) {
            t.items.retain(|(c, _), _| *c != cart);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart_store::SessionCartStore;
    use storefront_catalog::{ProductId, VariationId};
    use storefront_core::SessionId;

    fn key(variations: usize) -> LineKey {
        LineKey::new(
            ProductId::new(AggregateId::new()),
            (0..variations).map(|_| VariationId::new(AggregateId::new())),
        )
    }

    /// Both backings run the same script and must end in the same state.
    fn run_script(store: &dyn CartStore, owner: &CartOwner, keys: &[LineKey]) -> Vec<CartLine> {
        store.add(owner, &keys[0], 1).unwrap();
        store.add(owner, &keys[1], 2).unwrap();
        store.add(owner, &keys[0], 3).unwrap();
        store.set_quantity(owner, &keys[1], 5).unwrap();
        store.add(owner, &keys[2], 1).unwrap();
        store.remove(owner, &keys[2]).unwrap();
        store.remove(owner, &keys[2]).unwrap();
        store.set_quantity(owner, &keys[3], 9).unwrap();
        store.lines(owner).unwrap()
    }

    #[test]
    fn session_and_persistent_backings_agree() {
        let keys = vec![key(0), key(2), key(1), key(0)];
        let session = SessionCartStore::new();
        let persistent = PersistentCartStore::new();

        let a = run_script(&session, &CartOwner::Session(SessionId::new()), &keys);
        let b = run_script(&persistent, &CartOwner::Customer(CustomerId::new()), &keys);

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.iter().map(|l| l.quantity).sum::<u32>(), 9);
    }

    #[test]
    fn backings_list_lines_in_the_same_order() {
        // Newest key first, so key order and insertion order disagree.
        let keys: Vec<LineKey> = (0..6).map(|i| key(i % 3)).collect();
        let session = SessionCartStore::new();
        let persistent = PersistentCartStore::new();
        let s_owner = CartOwner::Session(SessionId::new());
        let p_owner = CartOwner::Customer(CustomerId::new());

        let backings: [(&dyn CartStore, &CartOwner); 2] = [(&session, &s_owner), (&persistent, &p_owner)];
        for (store, owner) in backings {
            for k in keys.iter().rev() {
                store.add(owner, k, 1).unwrap();
            }
        }

        let expected: Vec<LineKey> = keys.iter().rev().cloned().collect();
        let listed = |store: &dyn CartStore, owner: &CartOwner| -> Vec<LineKey> {
            store.lines(owner).unwrap().into_iter().map(|l| l.key).collect()
        };
        assert_eq!(listed(&session, &s_owner), expected);
        assert_eq!(listed(&persistent, &p_owner), expected);
    }

    #[test]
    fn lines_keep_insertion_order_and_clear_empties() {
        let store = PersistentCartStore::new();
        let owner = CartOwner::Customer(CustomerId::new());
        let (k1, k2) = (key(0), key(1));
        store.add(&owner, &k1, 1).unwrap();
        store.add(&owner, &k2, 1).unwrap();
        store.add(&owner, &k1, 1).unwrap();

        let lines = store.lines(&owner).unwrap();
        assert_eq!(lines[0].key, k1);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(lines[1].key, k2);

        store.clear(&owner).unwrap();
        assert!(store.lines(&owner).unwrap().is_empty());
        assert!(store.cart_created_at(owner.customer_id().unwrap()).is_some());
    }

    #[test]
    fn wrong_owner_kind_is_refused() {
        let store = PersistentCartStore::new();
        let owner = CartOwner::Session(SessionId::new());
        assert!(matches!(store.lines(&owner), Err(StoreError::UnsupportedOwner(_))));
    }
}
