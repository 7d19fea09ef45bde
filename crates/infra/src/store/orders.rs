use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use storefront_core::{AggregateRoot, CustomerId, ExpectedVersion};
use storefront_orders::{Order, OrderId, OrderNumber};

use super::StoreError;

pub trait OrderStore: Send + Sync {
    /// Insert a freshly placed order. Fails with `Duplicate` if the order
    /// number is taken.
    fn insert(&self, order: Order) -> Result<(), StoreError>;

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    fn by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    /// A customer's orders, newest first.
    fn for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StoreError>;

    /// Replace the stored order if its version still matches `expected`.
    fn update(&self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    /// Delete an order (checkout rollback). Returns what was removed.
    fn remove(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn insert(&self, order: Order) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get(id)
    }

    fn by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        (**self).by_number(number)
    }

    fn for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StoreError> {
        (**self).for_customer(customer_id)
    }

    fn update(&self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(order, expected)
    }

    fn remove(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).remove(id)
    }
}

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    by_number: HashMap<OrderNumber, OrderId>,
}

/// In-memory order table with a unique order-number index.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<Tables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: Order) -> Result<(), StoreError> {
        let number = order
            .order_number()
            .cloned()
            .ok_or_else(|| StoreError::Corrupt("order has not been placed".to_string()))?;
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if t.by_number.contains_key(&number) {
            return Err(StoreError::Duplicate(format!("order number {number}")));
        }
        let id = order.id_typed();
        if t.orders.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("order {id}")));
        }

        t.by_number.insert(number, id);
        t.orders.insert(id, order);
        Ok(())
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.orders.get(&id).cloned())
    }

    fn by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.by_number.get(number).and_then(|id| t.orders.get(id)).cloned())
    }

    fn for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut out: Vec<Order> = t
            .orders
            .values()
            .filter(|o| o.customer_id() == Some(customer_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(out)
    }

    fn update(&self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let id = order.id_typed();
        let current = t.orders.get(&id).ok_or(StoreError::NotFound("order"))?;

        if !expected.matches(current.version()) {
            return Err(StoreError::Conflict(format!(
                "order {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        if current.order_number() != order.order_number() {
            return Err(StoreError::Corrupt(format!("order {id}: order number is immutable")));
        }

        t.orders.insert(id, order);
        Ok(())
    }

    fn remove(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let removed = t.orders.remove(&id);
        if let Some(number) = removed.as_ref().and_then(|o| o.order_number()) {
            t.by_number.remove(number);
        }
        Ok(removed)
    }
}
