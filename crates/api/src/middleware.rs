use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use storefront_core::SessionId;

use crate::app::errors::json_error;
use crate::auth::JwtValidator;
use crate::context::ShopperContext;

/// Anonymous session handle, issued by the storefront front end.
pub const SESSION_HEADER: &str = "x-session-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Resolve the shopper context. Both identities are optional, but a
/// present-and-invalid one is rejected rather than ignored.
pub async fn shopper_context(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let session = extract_session(req.headers())?;

    let customer = match extract_bearer(req.headers())? {
        Some(token) => {
            let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
                tracing::debug!(error = %e, "bearer token rejected");
                json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid bearer token")
            })?;
            Some(claims.sub)
        }
        None => None,
    };

    req.extensions_mut().insert(ShopperContext::new(session, customer));
    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AdminState {
    pub token: Option<Arc<str>>,
}

/// Payment administration guard. With no token configured the routes are
/// disabled outright.
pub async fn admin_guard(
    State(state): State<AdminState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = state.token.as_deref() else {
        return Err(json_error(StatusCode::NOT_FOUND, "not_found", "admin routes are disabled"));
    };
    let given = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq(given.as_bytes(), expected.as_bytes()) {
        return Err(json_error(StatusCode::FORBIDDEN, "forbidden", "invalid admin token"));
    }
    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn extract_session(headers: &HeaderMap) -> Result<Option<SessionId>, Response> {
    let Some(raw) = headers.get(SESSION_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<SessionId>().ok())
        .map(Some)
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "invalid_session", "x-session-id must be a UUID"))
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, Response> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let unauthorized = || json_error(StatusCode::UNAUTHORIZED, "unauthorized", "malformed authorization header");

    let header = header.to_str().map_err(|_| unauthorized())?;
    let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?.trim();
    if token.is_empty() {
        return Err(unauthorized());
    }
    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_session(&headers).ok(), Some(None));

        let id = SessionId::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(extract_session(&headers).ok(), Some(Some(id)));

        headers.insert(SESSION_HEADER, HeaderValue::from_static("nope"));
        assert!(extract_session(&headers).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer(&headers).ok(), Some(Some("abc")));
    }

    #[test]
    fn admin_token_compare() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
