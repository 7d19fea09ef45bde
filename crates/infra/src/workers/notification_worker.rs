use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use storefront_core::{AggregateId, Money};
use storefront_events::Subscription;
use storefront_orders::{OrderEvent, OrderNumber, OrderPlaced};
use storefront_payments::{PaymentCompleted, PaymentEvent};

use crate::notify::{Email, Notifier};
use crate::publish::BusMessage;
use crate::store::OrderStore;

/// How many `(aggregate, sequence)` pairs to remember for redelivery checks.
const SEEN_CAPACITY: usize = 10_000;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Turns committed order/payment events into shopper emails.
///
/// Each `(aggregate_id, sequence_number)` is handled once, so a bus
/// redelivery does not send a second email.
pub struct NotificationHandler {
    notifier: Arc<dyn Notifier>,
    orders: Arc<dyn OrderStore>,
    from: String,
    currency: String,
    seen: HashSet<(AggregateId, u64)>,
    seen_order: VecDeque<(AggregateId, u64)>,
}

impl NotificationHandler {
    pub fn new(notifier: Arc<dyn Notifier>, orders: Arc<dyn OrderStore>, from: impl Into<String>) -> Self {
        Self {
            notifier,
            orders,
            from: from.into(),
            currency: "USD".to_string(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    /// Currency code printed next to amounts, e.g. `eur`.
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_ascii_uppercase();
        self
    }

    fn amount(&self, m: Money) -> String {
        format!("{m} {}", self.currency)
    }

    /// Handle one bus message. Delivery failures are logged, never returned.
    pub fn handle(&mut self, msg: &BusMessage) {
        let key = (msg.aggregate_id(), msg.sequence_number());
        if !self.seen.insert(key) {
            debug!(event_type = msg.event_type(), "duplicate delivery skipped");
            return;
        }
        self.seen_order.push_back(key);
        if self.seen_order.len() > SEEN_CAPACITY {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }

        let email = match msg.event_type() {
            "orders.order.placed" => match msg.decode::<OrderEvent>() {
                Ok(OrderEvent::OrderPlaced(e)) => Some(self.order_confirmation(&e)),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "undecodable order event");
                    None
                }
            },
            "payments.payment.completed" => match msg.decode::<PaymentEvent>() {
                Ok(PaymentEvent::PaymentCompleted(e)) => self.payment_received(&e),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "undecodable payment event");
                    None
                }
            },
            _ => None,
        };

        if let Some(email) = email {
            if let Err(e) = self.notifier.send(&email) {
                warn!(to = %email.to, subject = %email.subject, error = %e, "notification failed");
            }
        }
    }

    fn order_confirmation(&self, e: &OrderPlaced) -> Email {
        let mut items = String::new();
        for item in &e.items {
            items.push_str(&format!(
                "- {} x{} - {} each\n",
                item.product_name,
                item.quantity,
                self.amount(item.price)
            ));
        }
        let body = format!(
            "Thank you for your order!\n\n\
             Order Number: {number}\n\
             Total: {total}\n\n\
             We'll send you another email when your order ships.\n\n\
             Order Details:\n\
             Items:\n{items}\n\
             Subtotal: {subtotal}\n\
             Tax: {tax}\n\
             Shipping: {shipping}\n\
             Total: {total}\n",
            number = e.order_number,
            total = self.amount(e.totals.total),
            subtotal = self.amount(e.totals.subtotal),
            tax = self.amount(e.totals.tax),
            shipping = self.amount(e.totals.shipping_cost),
        );
        Email {
            from: self.from.clone(),
            to: e.purchaser.email.clone(),
            subject: format!("Order Confirmation - {}", e.order_number),
            body,
        }
    }

    fn payment_received(&self, e: &PaymentCompleted) -> Option<Email> {
        let to = self.recipient(&e.order_number)?;
        Some(Email {
            from: self.from.clone(),
            to,
            subject: format!("Payment received - {}", e.order_number),
            body: format!(
                "We received your payment of {} for order {}.\n\nYour order has been accepted and is being prepared.\n",
                self.amount(e.amount),
                e.order_number
            ),
        })
    }

    fn recipient(&self, number: &OrderNumber) -> Option<String> {
        match self.orders.by_number(number) {
            Ok(Some(order)) => order.purchaser().map(|p| p.email.clone()),
            Ok(None) => {
                warn!(order_number = %number, "payment completed for unknown order");
                None
            }
            Err(e) => {
                warn!(order_number = %number, error = %e, "order lookup failed");
                None
            }
        }
    }
}

/// Background thread running a [`NotificationHandler`] off a bus subscription.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    pub fn spawn(
        subscription: Subscription<BusMessage>,
        mut handler: NotificationHandler,
    ) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("notification-worker".to_string())
            .spawn(move || worker_loop(subscription, shutdown_rx, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(
    sub: Subscription<BusMessage>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut NotificationHandler,
) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            // Flush what is already queued before stopping.
            for msg in sub.drain() {
                handler.handle(&msg);
            }
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => handler.handle(&msg),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
