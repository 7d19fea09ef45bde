use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod simulated;
pub mod system;

/// Shopper-facing routes. All of them see a `ShopperContext`.
pub fn router() -> Router {
    Router::new()
        .nest("/products", catalog::router())
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::router())
        .nest("/orders", orders::router())
        .route("/simulated-checkout/:session_id", get(simulated::pay))
        .route("/whoami", get(system::whoami))
}

/// Gateway callbacks. Authenticated by signature, not by shopper identity.
pub fn webhook_router() -> Router {
    Router::new().route("/checkout/webhook", post(checkout::webhook))
}
