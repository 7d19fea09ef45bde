use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use storefront_catalog::Catalog;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/:slug", get(get_product))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let products: Vec<dto::ProductResponse> = services
        .catalog
        .list()
        .iter()
        .filter(|p| p.is_active)
        .map(dto::ProductResponse::from)
        .collect();
    (StatusCode::OK, Json(products)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(slug): Path<String>,
) -> axum::response::Response {
    match services.catalog.product_by_slug(&slug).filter(|p| p.is_active) {
        Some(p) => (StatusCode::OK, Json(dto::ProductResponse::from(&p))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}
