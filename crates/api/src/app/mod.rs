//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: stores, gateway, bus and services
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: JSON error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full router around already-wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let shopper = routes::router().layer(axum::middleware::from_fn_with_state(
        services.auth.clone(),
        middleware::shopper_context,
    ));
    let admin = routes::admin::router().layer(axum::middleware::from_fn_with_state(
        services.admin.clone(),
        middleware::admin_guard,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::webhook_router())
        .nest("/admin", admin)
        .merge(shopper)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
