use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use storefront_core::DomainError;
use storefront_infra::gateway::GatewayError;
use storefront_infra::services::{CartError, CheckoutError, SettlementError};
use storefront_infra::store::StoreError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn missing_owner() -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "missing_session",
        "an x-session-id header or a bearer token is required",
    )
}

/// Unreadable JSON body (bad syntax, wrong shape or content type).
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(rejection.status(), "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(rejection.status(), "invalid_query", rejection.body_text())
}

pub fn unauthenticated() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "sign in required")
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::Unavailable(msg) => json_error(StatusCode::BAD_REQUEST, "unavailable", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        e @ DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        DomainError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "invariant violation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}

pub fn gateway_error_to_response(err: GatewayError) -> axum::response::Response {
    json_error(StatusCode::BAD_GATEWAY, "gateway_error", err.to_string())
}

pub fn cart_error_to_response(err: CartError) -> axum::response::Response {
    match err {
        CartError::Domain(e) => domain_error_to_response(e),
        CartError::Store(e) => store_error_to_response(e),
    }
}

pub fn checkout_error_to_response(err: CheckoutError) -> axum::response::Response {
    match err {
        CheckoutError::EmptyCart => json_error(StatusCode::CONFLICT, "cart_empty", "your cart is empty"),
        CheckoutError::Domain(e) => domain_error_to_response(e),
        CheckoutError::Store(e) => store_error_to_response(e),
        CheckoutError::Gateway(e) => gateway_error_to_response(e),
    }
}

pub fn settlement_error_to_response(err: SettlementError) -> axum::response::Response {
    match err {
        SettlementError::Webhook(e) => {
            tracing::warn!(error = %e, "webhook rejected");
            json_error(StatusCode::BAD_REQUEST, "webhook_rejected", e.to_string())
        }
        SettlementError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        SettlementError::Domain(e) => domain_error_to_response(e),
        SettlementError::Store(e) => store_error_to_response(e),
        SettlementError::Gateway(e) => gateway_error_to_response(e),
        SettlementError::Contention(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}
