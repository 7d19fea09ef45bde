use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, SessionPaymentStatus,
    SessionStatus,
};

#[derive(Debug, Clone)]
struct SimSession {
    request: CheckoutSessionRequest,
    payment_status: SessionPaymentStatus,
    payment_intent: String,
}

/// In-process stand-in for the hosted checkout, used when no gateway key is
/// configured and in tests. Sessions are `cs_sim_*`, start unpaid, and are
/// marked paid with [`SimulatedGateway::mark_paid`].
#[derive(Debug)]
pub struct SimulatedGateway {
    base_url: String,
    sessions: Mutex<HashMap<String, SimSession>>,
    unavailable: AtomicBool,
}

impl SimulatedGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail as if the gateway were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn mark_paid(&self, session_id: &str) -> bool {
        self.set_status(session_id, SessionPaymentStatus::Paid)
    }

    pub fn set_status(&self, session_id: &str, status: SessionPaymentStatus) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        match sessions.get_mut(session_id) {
            Some(s) => {
                s.payment_status = status;
                true
            }
            None => false,
        }
    }

    /// The request a session was created from.
    pub fn request(&self, session_id: &str) -> Option<CheckoutSessionRequest> {
        self.sessions.lock().ok()?.get(session_id).map(|s| s.request.clone())
    }

    /// Payment intent id assigned to a session.
    pub fn payment_intent(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .ok()?
            .get(session_id)
            .map(|s| s.payment_intent.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("simulated gateway is unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.check_available()?;
        if request.line_items.is_empty() {
            return Err(GatewayError::Api {
                status: 400,
                message: "line_items must not be empty".to_string(),
            });
        }

        let token = Uuid::new_v4().simple().to_string();
        let id = format!("cs_sim_{token}");
        let session = SimSession {
            request,
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent: format!("pi_sim_{token}"),
        };
        self.sessions
            .lock()
            .map_err(|_| GatewayError::Transport("simulated gateway lock poisoned".to_string()))?
            .insert(id.clone(), session);

        Ok(CheckoutSession {
            url: Some(format!("{}/simulated-checkout/{}", self.base_url, id)),
            id,
            payment_intent: None,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, GatewayError> {
        self.check_available()?;
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| GatewayError::Transport("simulated gateway lock poisoned".to_string()))?;
        let s = sessions
            .get(session_id)
            .ok_or_else(|| GatewayError::UnknownSession(session_id.to_string()))?;

        Ok(SessionStatus {
            id: session_id.to_string(),
            payment_status: s.payment_status,
            payment_intent: s.payment_status.is_settled().then(|| s.payment_intent.clone()),
            order_number: s.request.metadata.get("order_number").cloned(),
        })
    }
}
