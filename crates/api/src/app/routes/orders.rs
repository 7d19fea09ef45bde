use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};
use crate::context::ShopperContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/:order_number", get(get_order))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
) -> axum::response::Response {
    let Some(customer) = shopper.customer() else {
        return errors::unauthenticated();
    };
    match services.orders.for_customer(customer) {
        Ok(orders) => {
            let out: Vec<dto::OrderSummaryResponse> = orders.iter().map(dto::OrderSummaryResponse::from).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Another customer's order reads as not found.
pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
    Path(order_number): Path<String>,
) -> axum::response::Response {
    let Some(customer) = shopper.customer() else {
        return errors::unauthenticated();
    };
    let number = match dto::parse_order_number(&order_number) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    let order = match services.orders.by_number(&number) {
        Ok(Some(o)) if o.customer_id() == Some(customer) => o,
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => return errors::store_error_to_response(e),
    };
    let payment = match services.payments.by_order(order.id_typed()) {
        Ok(p) => p,
        Err(e) => return errors::store_error_to_response(e),
    };

    (StatusCode::OK, Json(dto::OrderDetailResponse::new(&order, payment.as_ref()))).into_response()
}
