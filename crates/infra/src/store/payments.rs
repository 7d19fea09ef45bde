use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use storefront_core::{AggregateRoot, ExpectedVersion};
use storefront_orders::OrderId;
use storefront_payments::{Payment, PaymentId, TransactionId};

use super::StoreError;

pub trait PaymentStore: Send + Sync {
    /// Insert a begun payment. Transaction ids are unique, and an order has
    /// at most one payment.
    fn insert(&self, payment: Payment) -> Result<(), StoreError>;

    fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    fn by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>, StoreError>;

    fn by_payment_intent(&self, intent: &str) -> Result<Option<Payment>, StoreError>;

    fn by_order(&self, order_id: OrderId) -> Result<Option<Payment>, StoreError>;

    /// Replace the stored payment if its version still matches `expected`.
    fn update(&self, payment: Payment, expected: ExpectedVersion) -> Result<(), StoreError>;
}

impl<S> PaymentStore for Arc<S>
where
    S: PaymentStore + ?Sized,
{
    fn insert(&self, payment: Payment) -> Result<(), StoreError> {
        (**self).insert(payment)
    }

    fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        (**self).get(id)
    }

    fn by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>, StoreError> {
        (**self).by_transaction(transaction_id)
    }

    fn by_payment_intent(&self, intent: &str) -> Result<Option<Payment>, StoreError> {
        (**self).by_payment_intent(intent)
    }

    fn by_order(&self, order_id: OrderId) -> Result<Option<Payment>, StoreError> {
        (**self).by_order(order_id)
    }

    fn update(&self, payment: Payment, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(payment, expected)
    }
}

#[derive(Debug, Default)]
struct Tables {
    payments: HashMap<PaymentId, Payment>,
    by_transaction: HashMap<TransactionId, PaymentId>,
    by_intent: HashMap<String, PaymentId>,
    by_order: HashMap<OrderId, PaymentId>,
}

impl Tables {
    fn index_intent(&mut self, payment: &Payment) {
        if let Some(intent) = payment.payment_intent() {
            self.by_intent.insert(intent.to_string(), payment.id_typed());
        }
    }
}

/// In-memory payment table with transaction, intent and order indexes.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    inner: RwLock<Tables>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentStore for InMemoryPaymentStore {
    fn insert(&self, payment: Payment) -> Result<(), StoreError> {
        let (Some(txn), Some(order_id)) = (payment.transaction_id().cloned(), payment.order_id()) else {
            return Err(StoreError::Corrupt("payment has not begun".to_string()));
        };
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if t.by_transaction.contains_key(&txn) {
            return Err(StoreError::Duplicate(format!("transaction {txn}")));
        }
        if t.by_order.contains_key(&order_id) {
            return Err(StoreError::Duplicate(format!("payment for order {order_id}")));
        }

        let id = payment.id_typed();
        t.by_transaction.insert(txn, id);
        t.by_order.insert(order_id, id);
        t.index_intent(&payment);
        t.payments.insert(id, payment);
        Ok(())
    }

    fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.payments.get(&id).cloned())
    }

    fn by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.by_transaction
            .get(transaction_id)
            .and_then(|id| t.payments.get(id))
            .cloned())
    }

    fn by_payment_intent(&self, intent: &str) -> Result<Option<Payment>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.by_intent.get(intent).and_then(|id| t.payments.get(id)).cloned())
    }

    fn by_order(&self, order_id: OrderId) -> Result<Option<Payment>, StoreError> {
        let t = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(t.by_order.get(&order_id).and_then(|id| t.payments.get(id)).cloned())
    }

    fn update(&self, payment: Payment, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut t = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let id = payment.id_typed();
        let current = t.payments.get(&id).ok_or(StoreError::NotFound("payment"))?;

        if !expected.matches(current.version()) {
            return Err(StoreError::Conflict(format!(
                "payment {id}: expected {expected:?}, found {}",
                current.version()
            )));
        }
        if current.transaction_id() != payment.transaction_id() {
            return Err(StoreError::Corrupt(format!("payment {id}: transaction id is immutable")));
        }

        t.index_intent(&payment);
        t.payments.insert(id, payment);
        Ok(())
    }
}
