use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};
use crate::context::ShopperContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(view_cart))
        .route("/add", post(add_to_cart))
        .route("/update", post(update_cart))
        .route("/remove", post(remove_from_cart))
        .route("/merge", post(merge_carts))
}

pub async fn view_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
) -> axum::response::Response {
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    match services.carts.view(&owner) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::cart_error_to_response(e),
    }
}

pub async fn add_to_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
    body: Result<Json<dto::AddToCartRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(r) => return errors::json_rejection(r),
    };
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    let product_id = match dto::parse_product_id(&body.product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let variation_ids = match dto::parse_variation_ids(&body.variation_ids) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let key = match services.carts.add(&owner, product_id, body.quantity, variation_ids) {
        Ok(k) => k,
        Err(e) => return errors::cart_error_to_response(e),
    };
    let item_count = match services.carts.item_count(&owner) {
        Ok(n) => n,
        Err(e) => return errors::cart_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "line_key": key.encode(),
            "item_count": item_count,
        })),
    )
        .into_response()
}

pub async fn update_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
    body: Result<Json<dto::UpdateCartRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(r) => return errors::json_rejection(r),
    };
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    let key = match dto::parse_line_key(&body.line_key) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    if let Err(e) = services.carts.update(&owner, &key, body.quantity) {
        return errors::cart_error_to_response(e);
    }
    view_cart(Extension(services), Extension(shopper)).await
}

pub async fn remove_from_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
    body: Result<Json<dto::RemoveFromCartRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(r) => return errors::json_rejection(r),
    };
    let Some(owner) = shopper.cart_owner() else {
        return errors::missing_owner();
    };
    let key = match dto::parse_line_key(&body.line_key) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    if let Err(e) = services.carts.remove(&owner, &key) {
        return errors::cart_error_to_response(e);
    }
    view_cart(Extension(services), Extension(shopper)).await
}

/// Called by the identity provider right after login, with the shopper's
/// anonymous session header and the freshly issued bearer token.
pub async fn merge_carts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(shopper): Extension<ShopperContext>,
) -> axum::response::Response {
    let Some(customer) = shopper.customer() else {
        return errors::unauthenticated();
    };
    let Some(session) = shopper.session() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "missing_session", "x-session-id header is required");
    };
    match services.carts.merge(session, customer) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::cart_error_to_response(e),
    }
}
