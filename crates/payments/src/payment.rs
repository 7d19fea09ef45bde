use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use storefront_events::Event;
use storefront_orders::{OrderId, OrderNumber};

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Gateway transaction id (the hosted checkout session id). Unique per
/// payment and the key every settlement lookup goes by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("transaction id is empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Stripe,
    Paypal,
    BankTransfer,
    Cash,
}

/// Which path confirmed a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementSource {
    Webhook,
    ReturnUrl,
    Reconciliation,
}

impl core::fmt::Display for SettlementSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            SettlementSource::Webhook => "webhook",
            SettlementSource::ReturnUrl => "return_url",
            SettlementSource::Reconciliation => "reconciliation",
        })
    }
}

/// Aggregate root: Payment. One per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    order_id: Option<OrderId>,
    order_number: Option<OrderNumber>,
    method: PaymentMethod,
    transaction_id: Option<TransactionId>,
    payment_intent: Option<String>,
    amount: Money,
    status: PaymentStatus,
    failure_reason: Option<String>,
    metadata: serde_json::Value,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Payment {
    /// Create an empty, not-yet-begun aggregate instance.
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            order_id: None,
            order_number: None,
            method: PaymentMethod::default(),
            transaction_id: None,
            payment_intent: None,
            amount: Money::ZERO,
            status: PaymentStatus::Pending,
            failure_reason: None,
            metadata: serde_json::Value::Object(Default::default()),
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn is_begun(&self) -> bool {
        self.transaction_id.is_some()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.transaction_id.as_ref()
    }

    pub fn payment_intent(&self) -> Option<&str> {
        self.payment_intent.as_deref()
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Completed or refunded: nothing from the gateway moves it anymore.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, PaymentStatus::Completed | PaymentStatus::Refunded)
    }

    /// Decide and apply in one step. Returns the events that were applied.
    pub fn execute(&mut self, command: &PaymentCommand) -> Result<Vec<PaymentEvent>, DomainError> {
        let events = self.handle(command)?;
        for e in &events {
            self.apply(e);
        }
        Ok(events)
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    /// Record a fresh attempt right after the gateway session was created.
    Begin {
        order_id: OrderId,
        order_number: OrderNumber,
        method: PaymentMethod,
        transaction_id: TransactionId,
        payment_intent: Option<String>,
        amount: Money,
        metadata: serde_json::Value,
        occurred_at: DateTime<Utc>,
    },
    MarkProcessing {
        payment_intent: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Complete {
        payment_intent: Option<String>,
        source: SettlementSource,
        occurred_at: DateTime<Utc>,
    },
    Fail {
        reason: String,
        payment_intent: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    /// Administrator-set.
    Refund {
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

/// Event: PaymentBegun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBegun {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub method: PaymentMethod,
    pub transaction_id: TransactionId,
    pub payment_intent: Option<String>,
    pub amount: Money,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentProcessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProcessing {
    pub payment_id: PaymentId,
    pub transaction_id: TransactionId,
    pub payment_intent: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub transaction_id: TransactionId,
    pub payment_intent: Option<String>,
    pub amount: Money,
    pub source: SettlementSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub payment_id: PaymentId,
    pub order_number: OrderNumber,
    pub transaction_id: TransactionId,
    pub payment_intent: Option<String>,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRefunded {
    pub payment_id: PaymentId,
    pub order_number: OrderNumber,
    pub transaction_id: TransactionId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    PaymentBegun(PaymentBegun),
    PaymentProcessing(PaymentProcessing),
    PaymentCompleted(PaymentCompleted),
    PaymentFailed(PaymentFailed),
    PaymentRefunded(PaymentRefunded),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentBegun(_) => "payments.payment.begun",
            PaymentEvent::PaymentProcessing(_) => "payments.payment.processing",
            PaymentEvent::PaymentCompleted(_) => "payments.payment.completed",
            PaymentEvent::PaymentFailed(_) => "payments.payment.failed",
            PaymentEvent::PaymentRefunded(_) => "payments.payment.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::PaymentBegun(e) => e.occurred_at,
            PaymentEvent::PaymentProcessing(e) => e.occurred_at,
            PaymentEvent::PaymentCompleted(e) => e.occurred_at,
            PaymentEvent::PaymentFailed(e) => e.occurred_at,
            PaymentEvent::PaymentRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentBegun(e) => {
                self.id = e.payment_id;
                self.order_id = Some(e.order_id);
                self.order_number = Some(e.order_number.clone());
                self.method = e.method;
                self.transaction_id = Some(e.transaction_id.clone());
                self.payment_intent = e.payment_intent.clone();
                self.amount = e.amount;
                self.status = PaymentStatus::Pending;
                self.metadata = e.metadata.clone();
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            PaymentEvent::PaymentProcessing(e) => {
                self.status = PaymentStatus::Processing;
                self.link_intent(e.payment_intent.as_deref());
                self.updated_at = Some(e.occurred_at);
            }
            PaymentEvent::PaymentCompleted(e) => {
                self.status = PaymentStatus::Completed;
                self.failure_reason = None;
                self.link_intent(e.payment_intent.as_deref());
                self.updated_at = Some(e.occurred_at);
            }
            PaymentEvent::PaymentFailed(e) => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(e.reason.clone());
                self.link_intent(e.payment_intent.as_deref());
                self.updated_at = Some(e.occurred_at);
            }
            PaymentEvent::PaymentRefunded(e) => {
                self.status = PaymentStatus::Refunded;
                if let Some(reason) = &e.reason {
                    if let serde_json::Value::Object(map) = &mut self.metadata {
                        map.insert("refund_reason".to_string(), serde_json::Value::String(reason.clone()));
                    }
                }
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let PaymentCommand::Begin { .. } = command {
            return self.handle_begin(command);
        }

        let (Some(transaction_id), Some(order_id), Some(order_number)) =
            (&self.transaction_id, self.order_id, &self.order_number)
        else {
            return Err(DomainError::not_found("payment"));
        };

        match command {
            PaymentCommand::Begin { .. } => Ok(vec![]),
            PaymentCommand::MarkProcessing {
                payment_intent,
                occurred_at,
            } => {
                if self.status != PaymentStatus::Pending {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::PaymentProcessing(PaymentProcessing {
                    payment_id: self.id,
                    transaction_id: transaction_id.clone(),
                    payment_intent: payment_intent.clone(),
                    occurred_at: *occurred_at,
                })])
            }
            PaymentCommand::Complete {
                payment_intent,
                source,
                occurred_at,
            } => {
                // A later successful attempt on the same session may follow a
                // failure; completed and refunded are final.
                if self.is_settled() {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::PaymentCompleted(PaymentCompleted {
                    payment_id: self.id,
                    order_id,
                    order_number: order_number.clone(),
                    transaction_id: transaction_id.clone(),
                    payment_intent: payment_intent.clone(),
                    amount: self.amount,
                    source: *source,
                    occurred_at: *occurred_at,
                })])
            }
            PaymentCommand::Fail {
                reason,
                payment_intent,
                occurred_at,
            } => {
                if !matches!(self.status, PaymentStatus::Pending | PaymentStatus::Processing) {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::PaymentFailed(PaymentFailed {
                    payment_id: self.id,
                    order_number: order_number.clone(),
                    transaction_id: transaction_id.clone(),
                    payment_intent: payment_intent.clone(),
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                })])
            }
            PaymentCommand::Refund {
                reason,
                occurred_at,
            } => {
                // Administrator mark: allowed from any status, completed included.
                if self.status == PaymentStatus::Refunded {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentEvent::PaymentRefunded(PaymentRefunded {
                    payment_id: self.id,
                    order_number: order_number.clone(),
                    transaction_id: transaction_id.clone(),
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                })])
            }
        }
    }
}

impl Payment {
    fn handle_begin(&self, command: &PaymentCommand) -> Result<Vec<PaymentEvent>, DomainError> {
        let PaymentCommand::Begin {
            order_id,
            order_number,
            method,
            transaction_id,
            payment_intent,
            amount,
            metadata,
            occurred_at,
        } = command
        else {
            return Ok(vec![]);
        };

        if self.is_begun() {
            return Err(DomainError::conflict("payment already begun"));
        }
        if amount.to_gateway_amount().is_err() {
            return Err(DomainError::validation("payment amount cannot be negative"));
        }

        Ok(vec![PaymentEvent::PaymentBegun(PaymentBegun {
            payment_id: self.id,
            order_id: *order_id,
            order_number: order_number.clone(),
            method: *method,
            transaction_id: transaction_id.clone(),
            payment_intent: payment_intent.clone().filter(|p| !p.is_empty()),
            amount: *amount,
            metadata: metadata.clone(),
            occurred_at: *occurred_at,
        })])
    }

    fn link_intent(&mut self, intent: Option<&str>) {
        if let Some(intent) = intent.filter(|i| !i.is_empty()) {
            self.payment_intent = Some(intent.to_string());
        }
    }
}
