use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::ShopperContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(shopper): Extension<ShopperContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "session_id": shopper.session().map(|s| s.to_string()),
        "customer_id": shopper.customer().map(|c| c.to_string()),
        "cart_owner": shopper.cart_owner().map(|o| o.to_string()),
    }))
}
