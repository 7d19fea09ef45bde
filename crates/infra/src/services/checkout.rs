use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use storefront_cart::{CartLine, CartOwner, PricedLine, ResolvedCart};
use storefront_core::{AggregateId, DomainError, Money, TaxRate};
use storefront_orders::{CheckoutDetails, Order, OrderEvent, OrderId, OrderNumber, snapshot_command};
use storefront_payments::{Payment, PaymentCommand, PaymentEvent, PaymentId, PaymentMethod, TransactionId};

use crate::gateway::{CheckoutSessionRequest, GatewayError, PaymentGateway, line_items_for};
use crate::publish::EventPublisher;
use crate::services::cart::{CartError, CartService, log_skipped};
use crate::store::{OrderStore, PaymentStore, StoreError};

pub const ORDER_AGGREGATE: &str = "order";
pub const PAYMENT_AGGREGATE: &str = "payment";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::Domain(d) => CheckoutError::Domain(d),
            CartError::Store(s) => CheckoutError::Store(s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub tax_rate: TaxRate,
    pub shipping_cost: Money,
    /// ISO currency code sent to the gateway, lower case.
    pub currency: String,
    /// Base for the gateway's return URLs, without a trailing slash.
    pub public_base_url: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            tax_rate: TaxRate::default(),
            shipping_cost: Money::ZERO,
            currency: "usd".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Totals the checkout page shows before anything is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPreview {
    pub lines: Vec<PricedLine>,
    pub item_count: u64,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub warnings: Vec<String>,
}

/// An order frozen from a cart that has since been cleared.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub event: OrderEvent,
    /// Everything the cart held when it was cleared.
    pub consumed: Vec<CartLine>,
    pub warnings: Vec<String>,
}

/// A checkout handed off to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutStarted {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub transaction_id: TransactionId,
    pub redirect_url: String,
    pub total: Money,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    carts: CartService,
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: EventPublisher,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        carts: CartService,
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: EventPublisher,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            carts,
            orders,
            payments,
            gateway,
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn preview(&self, owner: &CartOwner) -> Result<CheckoutPreview, CheckoutError> {
        let resolved = self.carts.resolve(owner)?;
        let subtotal = resolved.subtotal();
        let tax = self.settings.tax_rate.tax_on(subtotal);
        let shipping_cost = self.settings.shipping_cost;
        Ok(CheckoutPreview {
            item_count: resolved.item_count(),
            subtotal,
            tax,
            shipping_cost,
            total: subtotal + tax + shipping_cost,
            warnings: resolved.warnings(),
            lines: resolved.lines,
        })
    }

    /// Freeze the owner's cart into an order and clear the cart.
    ///
    /// Runs under the owner's lock, so of two concurrent checkouts of the
    /// same cart exactly one gets the lines; the other sees an empty cart.
    pub fn snapshot_to_order(&self, owner: &CartOwner, details: CheckoutDetails) -> Result<PlacedOrder, CheckoutError> {
        let details = details.validate()?;

        self.carts.locks().with_locked(&[*owner], || {
            let store = self.carts.store_for(owner);
            let consumed = store.lines(owner)?;
            let resolved = ResolvedCart::resolve(self.carts.catalog(), &consumed);
            log_skipped(owner, &resolved.skipped);
            if resolved.is_empty() {
                return Err(CheckoutError::EmptyCart);
            }

            let order_id = OrderId::new(AggregateId::new());
            let build = |number: OrderNumber| {
                snapshot_command(
                    order_id,
                    number,
                    owner.customer_id(),
                    details.clone(),
                    &resolved,
                    self.settings.tax_rate,
                    self.settings.shipping_cost,
                    Utc::now(),
                )
                .and_then(Order::place)
            };

            let (order, event) = build(OrderNumber::generate())?;
            let (order, event) = match self.orders.insert(order.clone()) {
                Ok(()) => (order, event),
                Err(StoreError::Duplicate(reason)) => {
                    warn!(reason = %reason, "order number collision, regenerating");
                    let (order, event) = build(OrderNumber::generate())?;
                    self.orders.insert(order.clone())?;
                    (order, event)
                }
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = store.clear(owner) {
                // Without the clear the shopper could buy the same lines twice.
                self.orders.remove(order_id)?;
                return Err(e.into());
            }

            Ok(PlacedOrder {
                order,
                event,
                consumed,
                warnings: resolved.warnings(),
            })
        })
    }

    /// Snapshot the cart, open a hosted checkout session and record the
    /// pending payment.
    ///
    /// If the gateway call fails the order is deleted and the cart lines are
    /// put back, so the shopper can retry.
    pub async fn begin_checkout(
        &self,
        owner: &CartOwner,
        details: CheckoutDetails,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let placed = self.snapshot_to_order(owner, details)?;
        let order = &placed.order;

        match self.open_payment(order).await {
            Ok((payment, begun, redirect_url)) => {
                self.publisher
                    .publish_all(order.id_typed().0, ORDER_AGGREGATE, 0, std::slice::from_ref(&placed.event));
                self.publisher
                    .publish_all(payment.id_typed().0, PAYMENT_AGGREGATE, 0, &begun);

                let order_number = order
                    .order_number()
                    .cloned()
                    .ok_or_else(|| DomainError::invariant("placed order has no number"))?;
                let transaction_id = payment
                    .transaction_id()
                    .cloned()
                    .ok_or_else(|| DomainError::invariant("begun payment has no transaction id"))?;
                info!(
                    order_number = %order_number,
                    transaction_id = %transaction_id,
                    owner = %owner,
                    total = %order.totals().total,
                    "order placed"
                );
                Ok(CheckoutStarted {
                    order_id: order.id_typed(),
                    order_number,
                    transaction_id,
                    redirect_url,
                    total: order.totals().total,
                    warnings: placed.warnings,
                })
            }
            Err(e) => {
                self.roll_back(owner, &placed);
                Err(e)
            }
        }
    }

    async fn open_payment(
        &self,
        order: &Order,
    ) -> Result<(Payment, Vec<PaymentEvent>, String), CheckoutError> {
        let number = order
            .order_number()
            .ok_or_else(|| DomainError::invariant("placed order has no number"))?;
        let purchaser = order
            .purchaser()
            .ok_or_else(|| DomainError::invariant("placed order has no purchaser"))?;
        let base = self.settings.public_base_url.trim_end_matches('/');

        let mut metadata = BTreeMap::new();
        metadata.insert("order_number".to_string(), number.to_string());
        metadata.insert("order_id".to_string(), order.id_typed().to_string());

        let request = CheckoutSessionRequest {
            currency: self.settings.currency.clone(),
            customer_email: purchaser.email.clone(),
            line_items: line_items_for(order)?,
            success_url: format!("{base}/checkout/success?order={number}&session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/checkout/cancel?order={number}"),
            metadata,
        };

        let session = self.gateway.create_checkout_session(request).await.map_err(|e| {
            error!(order_number = %number, error = %e, "gateway refused checkout session");
            e
        })?;
        let redirect_url = session
            .url
            .ok_or_else(|| GatewayError::InvalidResponse("checkout session has no url".to_string()))?;

        let mut payment = Payment::empty(PaymentId::new(AggregateId::new()));
        let begun = payment.execute(&PaymentCommand::Begin {
            order_id: order.id_typed(),
            order_number: number.clone(),
            method: PaymentMethod::Stripe,
            transaction_id: TransactionId::new(session.id)?,
            payment_intent: session.payment_intent,
            amount: order.totals().total,
            metadata: serde_json::json!({ "order_number": number.as_str() }),
            occurred_at: Utc::now(),
        })?;
        self.payments.insert(payment.clone())?;
        Ok((payment, begun, redirect_url))
    }

    fn roll_back(&self, owner: &CartOwner, placed: &PlacedOrder) {
        let order_id = placed.order.id_typed();
        if let Err(e) = self.orders.remove(order_id) {
            error!(order_id = %order_id, error = %e, "failed to remove order after gateway failure");
        }
        let restored = self
            .carts
            .locks()
            .with_locked(&[*owner], || self.carts.store_for(owner).restore(owner, &placed.consumed));
        if let Err(e) = restored {
            error!(owner = %owner, error = %e, "failed to restore cart after gateway failure");
        }
    }
}
