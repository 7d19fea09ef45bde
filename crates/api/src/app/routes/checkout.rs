use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        Extension, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use storefront_orders::CheckoutDetails;

use crate::app::{dto, errors, services::AppServices};
use crate::context::ShopperContext;

/// Gateway signature header on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router {
    Router::new()
        .route("/preview", get(preview))
        .route("/session", post(create_session))
        .route("/success", get(success))
        .route("/cancel", get(cancel))
}

pub async fn preview(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
) -> axum::response::Response {
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    match services.checkout.preview(&owner) {
        Ok(p) => (StatusCode::OK, Json(p)).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}

/// Freeze the cart into an order and hand the shopper to the gateway.
pub async fn create_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
    details: Result<Json<CheckoutDetails>, JsonRejection>,
) -> axum::response::Response {
    let Json(details) = match details {
        Ok(d) => d,
        Err(r) => return errors::json_rejection(r),
    };
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    match services.checkout.begin_checkout(&owner, details).await {
        Ok(started) => (StatusCode::CREATED, Json(started)).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}

/// Gateway return point. The payment is re-verified server side; the query
/// string alone never marks anything paid.
pub async fn success(
    Extension(services): Extension<Arc<AppServices>>,
    q: Result<Query<dto::SuccessQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(q) = match q {
        Ok(q) => q,
        Err(r) => return errors::query_rejection(r),
    };
    let number = match dto::parse_order_number(&q.order) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    match services.settlement.confirm_return(&number, q.session_id.as_deref()).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_number": number,
                "status": outcome.order.status(),
                "payment_status": outcome.payment_status,
                "paid": outcome.paid(),
                "verified": outcome.verified,
                "total": outcome.order.totals().total,
            })),
        )
            .into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// The shopper backed out of the hosted page. The order stays `new` with a
/// pending payment; nothing is rolled back.
pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    q: Result<Query<dto::CancelQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(q) = match q {
        Ok(q) => q,
        Err(r) => return errors::query_rejection(r),
    };
    let number = match dto::parse_order_number(&q.order) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    match services.orders.by_number(&number) {
        Ok(Some(order)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_number": number,
                "status": order.status(),
                "message": "Payment was cancelled. Your order has been saved and you can pay for it later.",
            })),
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn webhook(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match services.settlement.handle_webhook(&body, signature) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "result": outcome })),
        )
            .into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}
