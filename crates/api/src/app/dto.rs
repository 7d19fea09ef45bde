//! Request/response bodies. Money amounts are integers in minor currency
//! units (cents).

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_cart::LineKey;
use storefront_catalog::{Product, ProductId, VariationId};
use storefront_core::Money;
use storefront_orders::{Address, Order, OrderItem, OrderNumber, OrderStatus, OrderTotals, Purchaser};
use storefront_payments::{Payment, PaymentStatus};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: String,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default)]
    pub variation_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub line_key: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub line_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub order: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub order: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub slug: String,
    pub sku: String,
    pub name: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub discount_percentage: Option<u8>,
    pub in_stock: bool,
    pub variations: Vec<VariationResponse>,
}

#[derive(Debug, Serialize)]
pub struct VariationResponse {
    pub id: VariationId,
    pub label: String,
    pub price_adjustment: Money,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            slug: p.slug.clone(),
            sku: p.sku.clone(),
            name: p.name.clone(),
            price: p.price,
            compare_at_price: p.compare_at_price,
            discount_percentage: p.discount_percentage(),
            in_stock: p.is_in_stock(),
            variations: p
                .variations
                .iter()
                .filter(|v| v.is_active)
                .map(|v| VariationResponse {
                    id: v.id,
                    label: v.label(),
                    price_adjustment: v.price_adjustment,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderSummaryResponse {
    pub order_number: Option<OrderNumber>,
    pub status: OrderStatus,
    pub item_count: u64,
    pub total: Money,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderSummaryResponse {
    fn from(o: &Order) -> Self {
        Self {
            order_number: o.order_number().cloned(),
            status: o.status(),
            item_count: o.item_count(),
            total: o.totals().total,
            created_at: o.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub order_number: Option<OrderNumber>,
    pub status: OrderStatus,
    pub purchaser: Option<Purchaser>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub notes: String,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub payment_status: Option<PaymentStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderDetailResponse {
    pub fn new(order: &Order, payment: Option<&Payment>) -> Self {
        Self {
            order_number: order.order_number().cloned(),
            status: order.status(),
            purchaser: order.purchaser().cloned(),
            shipping_address: order.shipping_address().cloned(),
            billing_address: order.billing_address().cloned(),
            notes: order.notes().to_string(),
            items: order.items().to_vec(),
            totals: order.totals(),
            payment_status: payment.map(|p| p.status()),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.trim()
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

pub fn parse_variation_ids(raw: &[String]) -> Result<Vec<VariationId>, axum::response::Response> {
    raw.iter()
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid variation id {v}")))
        })
        .collect()
}

pub fn parse_line_key(raw: &str) -> Result<LineKey, axum::response::Response> {
    LineKey::parse(raw.trim()).map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_line_key", e.to_string()))
}

/// Unknown and malformed order numbers both read as "not found".
pub fn parse_order_number(raw: &str) -> Result<OrderNumber, axum::response::Response> {
    OrderNumber::parse(raw.trim()).map_err(|_| errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"))
}
