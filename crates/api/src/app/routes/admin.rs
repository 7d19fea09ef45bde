use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use storefront_payments::TransactionId;

use crate::app::{dto, errors, services::AppServices};

/// Payment administration. Guarded by `middleware::admin_guard`.
pub fn router() -> Router {
    Router::new()
        .route("/payments/:transaction_id/reconcile", post(reconcile_payment))
        .route("/payments/:transaction_id/refund", post(refund_payment))
}

fn parse_transaction_id(raw: &str) -> Result<TransactionId, axum::response::Response> {
    TransactionId::new(raw.trim()).map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

pub async fn reconcile_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(transaction_id): Path<String>,
) -> axum::response::Response {
    let txn = match parse_transaction_id(&transaction_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match services.settlement.reconcile(&txn).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// Records a refund already issued at the gateway; nothing is sent to it.
pub async fn refund_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(transaction_id): Path<String>,
    body: Option<Json<dto::RefundRequest>>,
) -> axum::response::Response {
    let txn = match parse_transaction_id(&transaction_id) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let reason = body.and_then(|Json(b)| b.reason).filter(|r| !r.trim().is_empty());
    match services.settlement.refund(&txn, reason) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}
