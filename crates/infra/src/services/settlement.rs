//! Payment settlement.
//!
//! Three paths can report the outcome of one payment: the signed gateway
//! webhook, the shopper's return to the success page, and a manual
//! reconciliation. All of them funnel into [`SettlementService::settle`],
//! which decides on the freshest stored payment and writes with a
//! conditional update. Losing a race means reloading and deciding again,
//! and a decision that produces no events publishes nothing.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use storefront_core::{AggregateRoot, DomainError, ExpectedVersion};
use storefront_orders::{AcceptOrder, Order, OrderCommand, OrderId, OrderNumber};
use storefront_payments::{
    GatewayEventKind, Payment, PaymentCommand, PaymentStatus, SettlementSource, TransactionId, WebhookError,
    WebhookVerifier,
};

use crate::gateway::{GatewayError, PaymentGateway};
use crate::publish::EventPublisher;
use crate::services::checkout::{ORDER_AGGREGATE, PAYMENT_AGGREGATE};
use crate::store::{OrderStore, PaymentStore, StoreError};

/// Conditional-update attempts before giving up on a contended payment.
const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("gave up on {0} after repeated conflicting updates")]
    Contention(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The payment moved to `status`.
    Applied { status: PaymentStatus },
    /// The outcome was already recorded, or arrived too late to matter.
    Unchanged { status: PaymentStatus },
    /// Nothing to act on (unknown event type, unknown payment).
    Ignored { reason: String },
}

/// What the success page shows after re-checking with the gateway.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub order: Order,
    pub payment_status: PaymentStatus,
    /// Whether the gateway confirmed the status on this request.
    pub verified: bool,
}

impl ReturnOutcome {
    pub fn paid(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

enum Lookup<'a> {
    Transaction(&'a str),
    Intent(&'a str),
}

#[derive(Clone)]
pub struct SettlementService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: Arc<WebhookVerifier>,
    publisher: EventPublisher,
}

impl SettlementService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: Arc<WebhookVerifier>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            orders,
            payments,
            gateway,
            verifier,
            publisher,
        }
    }

    /// Authenticate a gateway callback and apply it.
    ///
    /// Nothing is read or written before the signature checks out.
    pub fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<SettlementOutcome, SettlementError> {
        let header = signature.ok_or_else(|| WebhookError::MalformedHeader("missing signature header".to_string()))?;
        let event = self.verifier.verify_event(payload, header, Utc::now())?;
        let now = Utc::now();

        let (lookup, command) = match &event.kind {
            GatewayEventKind::CheckoutSessionCompleted {
                session_id,
                payment_intent,
                paid,
                ..
            } => {
                let command = if *paid {
                    PaymentCommand::Complete {
                        payment_intent: payment_intent.clone(),
                        source: SettlementSource::Webhook,
                        occurred_at: now,
                    }
                } else {
                    PaymentCommand::MarkProcessing {
                        payment_intent: payment_intent.clone(),
                        occurred_at: now,
                    }
                };
                (Lookup::Transaction(session_id), command)
            }
            GatewayEventKind::CheckoutSessionAsyncSucceeded {
                session_id,
                payment_intent,
            } => (
                Lookup::Transaction(session_id),
                PaymentCommand::Complete {
                    payment_intent: payment_intent.clone(),
                    source: SettlementSource::Webhook,
                    occurred_at: now,
                },
            ),
            GatewayEventKind::CheckoutSessionAsyncFailed {
                session_id,
                payment_intent,
            } => (
                Lookup::Transaction(session_id),
                PaymentCommand::Fail {
                    reason: "asynchronous payment failed".to_string(),
                    payment_intent: payment_intent.clone(),
                    occurred_at: now,
                },
            ),
            GatewayEventKind::PaymentIntentProcessing { intent_id } => (
                Lookup::Intent(intent_id),
                PaymentCommand::MarkProcessing {
                    payment_intent: Some(intent_id.clone()),
                    occurred_at: now,
                },
            ),
            GatewayEventKind::PaymentIntentSucceeded { intent_id } => (
                Lookup::Intent(intent_id),
                PaymentCommand::Complete {
                    payment_intent: Some(intent_id.clone()),
                    source: SettlementSource::Webhook,
                    occurred_at: now,
                },
            ),
            GatewayEventKind::PaymentIntentFailed { intent_id, reason } => (
                Lookup::Intent(intent_id),
                PaymentCommand::Fail {
                    reason: reason.clone(),
                    payment_intent: Some(intent_id.clone()),
                    occurred_at: now,
                },
            ),
            GatewayEventKind::Other(kind) => {
                info!(event_id = %event.id, event_type = %kind, "gateway event ignored");
                return Ok(SettlementOutcome::Ignored {
                    reason: format!("unhandled event type {kind}"),
                });
            }
        };

        match self.settle(&lookup, &command)? {
            Some(outcome) => Ok(outcome),
            None => {
                info!(event_id = %event.id, event_type = %event.event_type, "gateway event for unknown payment");
                Ok(SettlementOutcome::Ignored {
                    reason: "unknown payment".to_string(),
                })
            }
        }
    }

    /// The success page path. Never trusts the query string: the payment is
    /// completed only if the gateway says the session is paid.
    ///
    /// A gateway outage degrades to showing the stored state unverified.
    pub async fn confirm_return(
        &self,
        order_number: &OrderNumber,
        session_id: Option<&str>,
    ) -> Result<ReturnOutcome, SettlementError> {
        let order = self
            .orders
            .by_number(order_number)?
            .ok_or(SettlementError::NotFound("order"))?;
        let payment = self
            .payments
            .by_order(order.id_typed())?
            .ok_or(SettlementError::NotFound("payment"))?;
        let transaction_id = payment
            .transaction_id()
            .cloned()
            .ok_or_else(|| DomainError::invariant("stored payment has no transaction id"))?;

        if let Some(sid) = session_id.filter(|sid| *sid != transaction_id.as_str()) {
            warn!(order_number = %order_number, session_id = %sid, "return session does not match order");
            return Ok(ReturnOutcome {
                order,
                payment_status: payment.status(),
                verified: false,
            });
        }

        let mut verified = payment.is_settled();
        if !payment.is_settled() {
            match self.gateway.retrieve_session(transaction_id.as_str()).await {
                Ok(status) => {
                    verified = true;
                    if status.payment_status.is_settled() {
                        self.settle(
                            &Lookup::Transaction(transaction_id.as_str()),
                            &PaymentCommand::Complete {
                                payment_intent: status.payment_intent,
                                source: SettlementSource::ReturnUrl,
                                occurred_at: Utc::now(),
                            },
                        )?;
                    }
                }
                Err(e) => {
                    warn!(order_number = %order_number, error = %e, "could not verify payment on return");
                }
            }
        }

        let order = self
            .orders
            .get(order.id_typed())?
            .ok_or(SettlementError::NotFound("order"))?;
        let payment_status = self
            .payments
            .by_transaction(&transaction_id)?
            .map(|p| p.status())
            .ok_or(SettlementError::NotFound("payment"))?;
        Ok(ReturnOutcome {
            order,
            payment_status,
            verified,
        })
    }

    /// Manual reconciliation: ask the gateway and complete if it reports
    /// the session paid.
    pub async fn reconcile(&self, transaction_id: &TransactionId) -> Result<SettlementOutcome, SettlementError> {
        let payment = self
            .payments
            .by_transaction(transaction_id)?
            .ok_or(SettlementError::NotFound("payment"))?;
        let status = self.gateway.retrieve_session(transaction_id.as_str()).await?;

        if !status.payment_status.is_settled() {
            info!(transaction_id = %transaction_id, "reconciliation found session unpaid");
            return Ok(SettlementOutcome::Unchanged {
                status: payment.status(),
            });
        }

        self.settle(
            &Lookup::Transaction(transaction_id.as_str()),
            &PaymentCommand::Complete {
                payment_intent: status.payment_intent,
                source: SettlementSource::Reconciliation,
                occurred_at: Utc::now(),
            },
        )?
        .ok_or(SettlementError::NotFound("payment"))
    }

    /// Record that an administrator refunded the payment outside this system.
    pub fn refund(&self, transaction_id: &TransactionId, reason: Option<String>) -> Result<SettlementOutcome, SettlementError> {
        self.settle(
            &Lookup::Transaction(transaction_id.as_str()),
            &PaymentCommand::Refund {
                reason,
                occurred_at: Utc::now(),
            },
        )?
        .ok_or(SettlementError::NotFound("payment"))
    }

    fn load(&self, lookup: &Lookup<'_>) -> Result<Option<Payment>, SettlementError> {
        let payment = match lookup {
            Lookup::Transaction(id) => self.payments.by_transaction(&TransactionId::new(*id)?)?,
            Lookup::Intent(intent) => self.payments.by_payment_intent(intent)?,
        };
        Ok(payment)
    }

    /// Apply one command to the current payment state. `None` when no
    /// payment matches.
    fn settle(&self, lookup: &Lookup<'_>, command: &PaymentCommand) -> Result<Option<SettlementOutcome>, SettlementError> {
        for _ in 0..MAX_ATTEMPTS {
            let Some(mut payment) = self.load(lookup)? else {
                return Ok(None);
            };
            let base = payment.version();
            let events = payment.execute(command)?;

            if events.is_empty() {
                info!(
                    payment_id = %payment.id_typed(),
                    status = %payment.status(),
                    command = command_name(command),
                    "settlement event discarded, outcome already recorded"
                );
                if payment.status() == PaymentStatus::Completed
                    && matches!(command, PaymentCommand::Complete { .. })
                {
                    // A previous completion may have stopped before the order
                    // was accepted.
                    self.accept_order(&payment)?;
                }
                return Ok(Some(SettlementOutcome::Unchanged {
                    status: payment.status(),
                }));
            }

            match self.payments.update(payment.clone(), ExpectedVersion::Exact(base)) {
                Ok(()) => {}
                Err(StoreError::Conflict(reason)) => {
                    info!(payment_id = %payment.id_typed(), reason = %reason, "payment changed underneath, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            info!(
                payment_id = %payment.id_typed(),
                status = %payment.status(),
                command = command_name(command),
                "payment settled"
            );
            self.publisher
                .publish_all(payment.id_typed().0, PAYMENT_AGGREGATE, base, &events);
            if payment.status() == PaymentStatus::Completed {
                self.accept_order(&payment)?;
            }
            return Ok(Some(SettlementOutcome::Applied {
                status: payment.status(),
            }));
        }

        Err(SettlementError::Contention(format!("payment ({})", lookup_label(lookup))))
    }

    /// `new -> accepted` once the payment completes. Orders already past
    /// `new` are left alone.
    fn accept_order(&self, payment: &Payment) -> Result<(), SettlementError> {
        let order_id = payment
            .order_id()
            .ok_or_else(|| DomainError::invariant("payment has no order"))?;

        for _ in 0..MAX_ATTEMPTS {
            let Some(mut order) = self.orders.get(order_id)? else {
                warn!(order_id = %order_id, "completed payment refers to a missing order");
                return Ok(());
            };
            let base = order.version();
            let events = order.execute(&accept_command(order_id))?;
            if events.is_empty() {
                return Ok(());
            }

            match self.orders.update(order.clone(), ExpectedVersion::Exact(base)) {
                Ok(()) => {
                    info!(order_id = %order_id, "order accepted");
                    self.publisher.publish_all(order_id.0, ORDER_AGGREGATE, base, &events);
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SettlementError::Contention(format!("order {order_id}")))
    }
}

fn accept_command(order_id: OrderId) -> OrderCommand {
    OrderCommand::AcceptOrder(AcceptOrder {
        order_id,
        occurred_at: Utc::now(),
    })
}

fn command_name(command: &PaymentCommand) -> &'static str {
    match command {
        PaymentCommand::Begin { .. } => "begin",
        PaymentCommand::MarkProcessing { .. } => "mark_processing",
        PaymentCommand::Complete { .. } => "complete",
        PaymentCommand::Fail { .. } => "fail",
        PaymentCommand::Refund { .. } => "refund",
    }
}

fn lookup_label(lookup: &Lookup<'_>) -> String {
    match lookup {
        Lookup::Transaction(id) => format!("transaction {id}"),
        Lookup::Intent(id) => format!("intent {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storefront_cart::CartOwner;
    use storefront_catalog::{Product, ProductId};
    use storefront_core::{AggregateId, Money, SessionId};
    use storefront_events::InMemoryEventBus;
    use storefront_orders::{AddressInput, CheckoutDetails, OrderStatus};
    use storefront_payments::DEFAULT_TOLERANCE_SECS;

    use crate::cart_store::{PersistentCartStore, SessionCartStore};
    use crate::catalog::InMemoryCatalog;
    use crate::gateway::SimulatedGateway;
    use crate::locks::OwnerLocks;
    use crate::notify::RecordingNotifier;
    use crate::services::{CartService, CheckoutService, CheckoutSettings, CheckoutStarted};
    use crate::store::{InMemoryOrderStore, InMemoryPaymentStore};
    use crate::workers::NotificationHandler;

    const SECRET: &str = "whsec_test";

    struct Fixture {
        checkout: CheckoutService,
        settlement: SettlementService,
        carts: CartService,
        catalog: Arc<InMemoryCatalog>,
        orders: Arc<InMemoryOrderStore>,
        payments: Arc<InMemoryPaymentStore>,
        gateway: Arc<SimulatedGateway>,
        publisher: EventPublisher,
        verifier: WebhookVerifier,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(InMemoryCatalog::new());
        let carts = CartService::new(
            catalog.clone(),
            Arc::new(SessionCartStore::new()),
            Arc::new(PersistentCartStore::new()),
            Arc::new(OwnerLocks::new()),
        );
        let orders = Arc::new(InMemoryOrderStore::new());
        let payments = Arc::new(InMemoryPaymentStore::new());
        let gateway = Arc::new(SimulatedGateway::new("http://gateway.test"));
        let publisher = EventPublisher::new(Arc::new(InMemoryEventBus::new()));
        let checkout = CheckoutService::new(
            carts.clone(),
            orders.clone(),
            payments.clone(),
            gateway.clone(),
            publisher.clone(),
            CheckoutSettings::default(),
        );
        let settlement = SettlementService::new(
            orders.clone(),
            payments.clone(),
            gateway.clone(),
            Arc::new(WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS)),
            publisher.clone(),
        );
        Fixture {
            checkout,
            settlement,
            carts,
            catalog,
            orders,
            payments,
            gateway,
            publisher,
            verifier: WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS),
        }
    }

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            email: "grace@example.com".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            phone: "555-0199".to_string(),
            shipping: AddressInput {
                street: "2 Harbor Rd".to_string(),
                city: "Arlington".to_string(),
                state: "VA".to_string(),
                postal_code: "22201".to_string(),
                country: None,
            },
            billing: None,
            notes: None,
        }
    }

    async fn place_order(f: &Fixture) -> CheckoutStarted {
        let table = Product {
            id: ProductId::new(AggregateId::new()),
            slug: "table".to_string(),
            sku: "TBL-1".to_string(),
            name: "Table".to_string(),
            price: Money::from_minor(5_000),
            compare_at_price: None,
            stock: 2,
            is_active: true,
            variations: vec![],
        };
        f.catalog.upsert(table.clone());
        let owner = CartOwner::Session(SessionId::new());
        f.carts.add(&owner, table.id, 1, vec![]).unwrap();
        f.checkout.begin_checkout(&owner, details()).await.unwrap()
    }

    fn signed(f: &Fixture, event: serde_json::Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(&event).unwrap();
        let header = f.verifier.sign(&body, Utc::now().timestamp());
        (body, header)
    }

    fn session_completed(session_id: &str, intent: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": session_id,
                "payment_intent": intent,
                "payment_status": "paid",
            }}
        })
    }

    fn intent_failed(intent: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": intent,
                "last_payment_error": { "message": "card declined" },
            }}
        })
    }

    fn status_of(f: &Fixture, started: &CheckoutStarted) -> (PaymentStatus, OrderStatus) {
        let payment = f.payments.by_transaction(&started.transaction_id).unwrap().unwrap();
        let order = f.orders.get(started.order_id).unwrap().unwrap();
        (payment.status(), order.status())
    }

    #[tokio::test]
    async fn replayed_webhook_completes_once_and_sends_one_receipt() {
        let f = fixture();
        let notifier = Arc::new(RecordingNotifier::new());
        let mut handler = NotificationHandler::new(notifier.clone(), f.orders.clone(), "shop@example.com");
        let sub = f.publisher.subscribe();
        let started = place_order(&f).await;

        let (body, header) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_123"));
        let first = f.settlement.handle_webhook(&body, Some(&header)).unwrap();
        let second = f.settlement.handle_webhook(&body, Some(&header)).unwrap();

        assert_eq!(first, SettlementOutcome::Applied { status: PaymentStatus::Completed });
        assert_eq!(second, SettlementOutcome::Unchanged { status: PaymentStatus::Completed });
        assert_eq!(status_of(&f, &started), (PaymentStatus::Completed, OrderStatus::Accepted));

        for msg in sub.drain() {
            handler.handle(&msg);
        }
        let receipts: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|e| e.subject.starts_with("Payment received"))
            .collect();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].to, "grace@example.com");
    }

    #[tokio::test]
    async fn failure_after_completion_is_discarded() {
        let f = fixture();
        let started = place_order(&f).await;

        let (body, header) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_late"));
        f.settlement.handle_webhook(&body, Some(&header)).unwrap();

        let (body, header) = signed(&f, intent_failed("pi_late"));
        let outcome = f.settlement.handle_webhook(&body, Some(&header)).unwrap();

        assert_eq!(outcome, SettlementOutcome::Unchanged { status: PaymentStatus::Completed });
        assert_eq!(status_of(&f, &started), (PaymentStatus::Completed, OrderStatus::Accepted));
    }

    #[tokio::test]
    async fn failed_payment_leaves_order_new_and_can_still_complete() {
        let f = fixture();
        let started = place_order(&f).await;
        let mut unpaid = session_completed(started.transaction_id.as_str(), "pi_retry");
        unpaid["data"]["object"]["payment_status"] = serde_json::json!("unpaid");
        let (unpaid_body, unpaid_header) = signed(&f, unpaid);

        f.settlement.handle_webhook(&unpaid_body, Some(&unpaid_header)).unwrap();
        assert_eq!(status_of(&f, &started), (PaymentStatus::Processing, OrderStatus::New));

        let (body, header) = signed(&f, intent_failed("pi_retry"));
        f.settlement.handle_webhook(&body, Some(&header)).unwrap();
        assert_eq!(status_of(&f, &started), (PaymentStatus::Failed, OrderStatus::New));

        let (body, header) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_retry"));
        f.settlement.handle_webhook(&body, Some(&header)).unwrap();
        assert_eq!(status_of(&f, &started), (PaymentStatus::Completed, OrderStatus::Accepted));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_change() {
        let f = fixture();
        let started = place_order(&f).await;
        let (body, _) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_x"));
        let forged = WebhookVerifier::new("whsec_other", DEFAULT_TOLERANCE_SECS).sign(&body, Utc::now().timestamp());

        assert!(matches!(
            f.settlement.handle_webhook(&body, Some(&forged)),
            Err(SettlementError::Webhook(WebhookError::SignatureMismatch))
        ));
        assert!(matches!(
            f.settlement.handle_webhook(&body, None),
            Err(SettlementError::Webhook(WebhookError::MalformedHeader(_)))
        ));
        assert_eq!(status_of(&f, &started), (PaymentStatus::Pending, OrderStatus::New));
    }

    #[tokio::test]
    async fn unknown_payment_and_unknown_type_are_acknowledged() {
        let f = fixture();
        let (body, header) = signed(&f, session_completed("cs_nobody", "pi_nobody"));
        assert!(matches!(
            f.settlement.handle_webhook(&body, Some(&header)).unwrap(),
            SettlementOutcome::Ignored { .. }
        ));

        let (body, header) = signed(
            &f,
            serde_json::json!({ "id": "evt_9", "type": "customer.created", "data": { "object": { "id": "cus_1" } } }),
        );
        assert!(matches!(
            f.settlement.handle_webhook(&body, Some(&header)).unwrap(),
            SettlementOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn return_url_completes_only_when_gateway_reports_paid() {
        let f = fixture();
        let started = place_order(&f).await;
        let sid = started.transaction_id.as_str();

        let unpaid = f.settlement.confirm_return(&started.order_number, Some(sid)).await.unwrap();
        assert!(!unpaid.paid());
        assert!(unpaid.verified);
        assert_eq!(unpaid.order.status(), OrderStatus::New);

        f.gateway.mark_paid(sid);
        let paid = f.settlement.confirm_return(&started.order_number, Some(sid)).await.unwrap();
        assert!(paid.paid());
        assert_eq!(paid.order.status(), OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn return_url_survives_gateway_outage() {
        let f = fixture();
        let started = place_order(&f).await;
        f.gateway.mark_paid(started.transaction_id.as_str());
        f.gateway.set_unavailable(true);

        let outcome = f
            .settlement
            .confirm_return(&started.order_number, Some(started.transaction_id.as_str()))
            .await
            .unwrap();
        assert!(!outcome.verified);
        assert!(!outcome.paid());
    }

    #[tokio::test]
    async fn reconcile_and_webhook_race_to_one_completion() {
        let f = fixture();
        let sub = f.publisher.subscribe();
        let started = place_order(&f).await;
        f.gateway.mark_paid(started.transaction_id.as_str());

        let (body, header) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_race"));
        let settlement = f.settlement.clone();
        let webhook = std::thread::spawn(move || settlement.handle_webhook(&body, Some(&header)));
        let reconciled = f.settlement.reconcile(&started.transaction_id).await.unwrap();
        let hooked = webhook.join().unwrap().unwrap();

        let applied = [reconciled, hooked]
            .iter()
            .filter(|o| matches!(o, SettlementOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 1);

        let completions = sub
            .drain()
            .iter()
            .filter(|m| m.event_type() == "payments.payment.completed")
            .count();
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn refund_marks_payment_refunded_once() {
        let f = fixture();
        let started = place_order(&f).await;
        let (body, header) = signed(&f, session_completed(started.transaction_id.as_str(), "pi_r"));
        f.settlement.handle_webhook(&body, Some(&header)).unwrap();

        let first = f
            .settlement
            .refund(&started.transaction_id, Some("damaged in transit".to_string()))
            .unwrap();
        let again = f.settlement.refund(&started.transaction_id, None).unwrap();

        assert_eq!(first, SettlementOutcome::Applied { status: PaymentStatus::Refunded });
        assert_eq!(again, SettlementOutcome::Unchanged { status: PaymentStatus::Refunded });
        let payment = f.payments.by_transaction(&started.transaction_id).unwrap().unwrap();
        assert_eq!(payment.metadata()["refund_reason"], "damaged in transit");
        // Refunds never move the order.
        assert_eq!(f.orders.get(started.order_id).unwrap().unwrap().status(), OrderStatus::Accepted);
    }

    #[test]
    fn unknown_transaction_is_not_found() {
        let f = fixture();
        let txn = TransactionId::new("cs_missing").unwrap();
        assert!(matches!(f.settlement.refund(&txn, None), Err(SettlementError::NotFound("payment"))));
    }
}
