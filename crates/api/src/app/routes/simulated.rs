use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};

use crate::app::{errors, services::AppServices};

/// Hosted page of the simulated gateway: visiting it pays the session and
/// sends the shopper back to the success URL, like the real gateway would.
pub async fn pay(
    Extension(services): Extension<Arc<AppServices>>,
    Path(session_id): Path<String>,
) -> axum::response::Response {
    let Some(gateway) = services.simulated_gateway.as_ref() else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "simulated gateway is not enabled");
    };
    let Some(request) = gateway.request(&session_id) else {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown checkout session");
    };
    gateway.mark_paid(&session_id);
    let target = request.success_url.replace("{CHECKOUT_SESSION_ID}", &session_id);
    Redirect::to(&target).into_response()
}
