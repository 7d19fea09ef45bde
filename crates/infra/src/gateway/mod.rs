//! Hosted payment gateway.

pub mod simulated;
pub mod stripe;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use storefront_core::{DomainResult, Money};
use storefront_orders::Order;

pub use simulated::SimulatedGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("unknown checkout session {0}")]
    UnknownSession(String),
}

/// One line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLineItem {
    pub name: String,
    /// Minor currency units.
    pub unit_amount: u64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub customer_email: String,
    pub line_items: Vec<GatewayLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionRequest {
    pub fn amount_total(&self) -> u64 {
        self.line_items
            .iter()
            .map(|l| l.unit_amount * u64::from(l.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Where to send the shopper.
    pub url: Option<String>,
    pub payment_intent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl SessionPaymentStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "paid" => Some(Self::Paid),
            "unpaid" => Some(Self::Unpaid),
            "no_payment_required" => Some(Self::NoPaymentRequired),
            _ => None,
        }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, Self::Paid | Self::NoPaymentRequired)
    }
}

/// Gateway-side view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub id: String,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent: Option<String>,
    pub order_number: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, GatewayError>;
}

#[async_trait]
impl<G> PaymentGateway for Arc<G>
where
    G: PaymentGateway + ?Sized,
{
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        (**self).create_checkout_session(request).await
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        (**self).retrieve_session(session_id).await
    }
}

/// Hosted-page lines for an order: one per item at its frozen unit price,
/// then `Tax` and `Shipping` when non-zero. They always sum to the total.
pub fn line_items_for(order: &Order) -> DomainResult<Vec<GatewayLineItem>> {
    let mut lines = Vec::with_capacity(order.items().len() + 2);
    for item in order.items() {
        lines.push(GatewayLineItem {
            name: item.product_name.clone(),
            unit_amount: item.price.to_gateway_amount()?,
            quantity: item.quantity,
        });
    }

    let totals = order.totals();
    for (name, amount) in [("Tax", totals.tax), ("Shipping", totals.shipping_cost)] {
        if amount > Money::ZERO {
            lines.push(GatewayLineItem {
                name: name.to_string(),
                unit_amount: amount.to_gateway_amount()?,
                quantity: 1,
            });
        }
    }
    Ok(lines)
}
