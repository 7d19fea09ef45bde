//! Gateway webhook authentication and event parsing.
//!
//! Signature header: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`, where each
//! `v1` is HMAC-SHA256 over `"<t>.<raw body>"` keyed by the endpoint secret.
//! Nothing is parsed or acted on until the signature and timestamp check out.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("no signature matches the payload")]
    SignatureMismatch,

    #[error("timestamp outside tolerance ({skew_secs}s skew)")]
    TimestampOutsideTolerance { skew_secs: i64 },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Verifies signed gateway deliveries against one endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl core::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Sign `payload` at `timestamp` into a header value. Used by tests and
    /// local tooling that replays deliveries.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, hex::encode(self.mac(payload, timestamp)))
    }

    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<(), WebhookError> {
        let (timestamp, signatures) = parse_header(header)?;

        let skew = now.timestamp() - timestamp;
        if skew.abs() > self.tolerance_secs {
            return Err(WebhookError::TimestampOutsideTolerance { skew_secs: skew });
        }

        let matched = signatures.iter().any(|sig| {
            let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
                return false;
            };
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(sig).is_ok()
        });
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }
        Ok(())
    }

    /// Verify, then parse the body into a [`GatewayEvent`].
    pub fn verify_event(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<GatewayEvent, WebhookError> {
        self.verify(payload, header, now)?;
        GatewayEvent::parse(payload)
    }

    fn mac(&self, payload: &[u8], timestamp: i64) -> Vec<u8> {
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mut mac) => {
                mac.update(timestamp.to_string().as_bytes());
                mac.update(b".");
                mac.update(payload);
                mac.finalize().into_bytes().to_vec()
            }
            Err(_) => Vec::new(),
        }
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<Vec<u8>>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((k, v)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedHeader(format!("bad element '{part}'")));
        };
        match k {
            "t" => {
                let t = v
                    .parse::<i64>()
                    .map_err(|_| WebhookError::MalformedHeader("timestamp is not a number".into()))?;
                timestamp = Some(t);
            }
            "v1" => {
                let sig = hex::decode(v)
                    .map_err(|_| WebhookError::MalformedHeader("signature is not hex".into()))?;
                signatures.push(sig);
            }
            // Other schemes (v0, test signatures) are ignored.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| WebhookError::MalformedHeader("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader("missing v1 signature".into()));
    }
    Ok((timestamp, signatures))
}

/// What an authenticated delivery asks settlement to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    /// `checkout.session.completed`. `paid` is false for delayed payment
    /// methods, which finish later with an async event.
    CheckoutSessionCompleted {
        session_id: String,
        payment_intent: Option<String>,
        paid: bool,
        order_number: Option<String>,
    },
    CheckoutSessionAsyncSucceeded {
        session_id: String,
        payment_intent: Option<String>,
    },
    CheckoutSessionAsyncFailed {
        session_id: String,
        payment_intent: Option<String>,
    },
    PaymentIntentProcessing {
        intent_id: String,
    },
    PaymentIntentSucceeded {
        intent_id: String,
    },
    PaymentIntentFailed {
        intent_id: String,
        reason: String,
    },
    /// Acknowledged and ignored.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    pub id: String,
    pub event_type: String,
    pub kind: GatewayEventKind,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Debug, Default, Deserialize)]
struct RawObject {
    id: Option<String>,
    payment_intent: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Debug, Deserialize)]
struct RawPaymentError {
    message: Option<String>,
}

impl GatewayEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let obj = raw.data.object;
        let object_id = || {
            obj.id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| WebhookError::MalformedPayload("event object has no id".into()))
        };
        let intent = obj.payment_intent.clone().filter(|p| !p.is_empty());

        let kind = match raw.event_type.as_str() {
            "checkout.session.completed" => GatewayEventKind::CheckoutSessionCompleted {
                session_id: object_id()?,
                payment_intent: intent,
                paid: matches!(
                    obj.payment_status.as_deref(),
                    None | Some("paid") | Some("no_payment_required")
                ),
                order_number: obj
                    .metadata
                    .get("order_number")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
            "checkout.session.async_payment_succeeded" => {
                GatewayEventKind::CheckoutSessionAsyncSucceeded {
                    session_id: object_id()?,
                    payment_intent: intent,
                }
            }
            "checkout.session.async_payment_failed" => GatewayEventKind::CheckoutSessionAsyncFailed {
                session_id: object_id()?,
                payment_intent: intent,
            },
            "payment_intent.processing" => GatewayEventKind::PaymentIntentProcessing {
                intent_id: object_id()?,
            },
            "payment_intent.succeeded" => GatewayEventKind::PaymentIntentSucceeded {
                intent_id: object_id()?,
            },
            "payment_intent.payment_failed" => GatewayEventKind::PaymentIntentFailed {
                intent_id: object_id()?,
                reason: obj
                    .last_payment_error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "payment failed".to_string()),
            },
            other => GatewayEventKind::Other(other.to_string()),
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            kind,
        })
    }
}
