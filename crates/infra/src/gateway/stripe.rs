use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, SessionPaymentStatus,
    SessionStatus,
};

/// Stripe Checkout Sessions over the REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl core::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    url: Option<String>,
    payment_intent: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("customer_email".to_string(), request.customer_email.clone()),
        ];
        for (i, line) in request.line_items.iter().enumerate() {
            let p = format!("line_items[{i}]");
            form.push((format!("{p}[price_data][currency]"), request.currency.clone()));
            form.push((format!("{p}[price_data][product_data][name]"), line.name.clone()));
            form.push((format!("{p}[price_data][unit_amount]"), line.unit_amount.to_string()));
            form.push((format!("{p}[quantity]"), line.quantity.to_string()));
        }
        for (k, v) in &request.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }
        form
    }

    async fn read_session(response: reqwest::Response) -> Result<SessionBody, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message.unwrap_or_default(),
                Err(e) => e.to_string(),
            };
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<SessionBody>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&Self::session_form(&request))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let body = Self::read_session(response).await?;
        debug!(session_id = %body.id, "stripe checkout session created");
        Ok(CheckoutSession {
            id: body.id,
            url: body.url,
            payment_intent: body.payment_intent,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::UnknownSession(session_id.to_string()));
        }
        let body = Self::read_session(response).await?;
        let raw_status = body.payment_status.unwrap_or_default();
        let payment_status = SessionPaymentStatus::parse(&raw_status).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("payment_status '{raw_status}'"))
        })?;

        Ok(SessionStatus {
            id: body.id,
            payment_status,
            payment_intent: body.payment_intent,
            order_number: body.metadata.get("order_number").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayLineItem;

    #[test]
    fn form_encodes_lines_and_metadata() {
        let request = CheckoutSessionRequest {
            currency: "usd".into(),
            customer_email: "a@example.com".into(),
            line_items: vec![
                GatewayLineItem { name: "Oak Table".into(), unit_amount: 25_000, quantity: 1 },
                GatewayLineItem { name: "Tax".into(), unit_amount: 2_500, quantity: 1 },
            ],
            success_url: "http://localhost/checkout/success".into(),
            cancel_url: "http://localhost/checkout/cancel".into(),
            metadata: [("order_number".to_string(), "ORD-000000000001".to_string())].into(),
        };
        let form = StripeGateway::session_form(&request);
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("25000"));
        assert_eq!(get("line_items[1][price_data][product_data][name]"), Some("Tax"));
        assert_eq!(get("line_items[1][quantity]"), Some("1"));
        assert_eq!(get("metadata[order_number]"), Some("ORD-000000000001"));
        assert_eq!(get("mode"), Some("payment"));
    }
}
