//! Customer bearer tokens.
//!
//! The identity provider issues HS256 tokens whose `sub` is the customer
//! id. This module only verifies them; issuing is done elsewhere (and in
//! tests).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_core::CustomerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Customer the token was issued to.
    pub sub: CustomerId,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(sub: CustomerId, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed or unsigned token: {0}")]
    Invalid(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Check the claim time window against `now`.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(())
}

pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

impl<V> JwtValidator for Arc<V>
where
    V: JwtValidator + ?Sized,
{
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        (**self).validate(token, now)
    }
}

pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks happen in `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Sign a token the way the identity provider does. Used by dev tooling and
/// tests.
pub fn issue_token(secret: &[u8], claims: &JwtClaims) -> Result<String, TokenError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| TokenError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn accepts_own_tokens_and_rejects_others() {
        let now = Utc::now();
        let customer = CustomerId::new();
        let claims = JwtClaims::new(customer, now, Duration::minutes(10));
        let token = issue_token(b"right", &claims).unwrap();

        let ok = Hs256JwtValidator::new(b"right").validate(&token, now).unwrap();
        assert_eq!(ok.sub, customer);

        assert!(matches!(
            Hs256JwtValidator::new(b"wrong").validate(&token, now),
            Err(TokenError::Invalid(_))
        ));
        assert_eq!(
            Hs256JwtValidator::new(b"right").validate(&token, now + Duration::minutes(11)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn time_window_is_checked() {
        let now = Utc::now();
        let c = CustomerId::new();
        assert_eq!(
            validate_claims(&JwtClaims::new(c, now, Duration::zero()), now),
            Err(TokenError::InvalidTimeWindow)
        );
        assert_eq!(
            validate_claims(&JwtClaims::new(c, now + Duration::minutes(5), Duration::minutes(10)), now),
            Err(TokenError::NotYetValid)
        );
    }
}
