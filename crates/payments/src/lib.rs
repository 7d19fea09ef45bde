//! `storefront-payments`: payment settlement state machine and gateway
//! webhook authentication.

pub mod payment;
pub mod webhook;

pub use payment::{
    Payment, PaymentBegun, PaymentCommand, PaymentCompleted, PaymentEvent, PaymentFailed,
    PaymentId, PaymentMethod, PaymentProcessing, PaymentRefunded, PaymentStatus,
    SettlementSource, TransactionId,
};
pub use webhook::{DEFAULT_TOLERANCE_SECS, GatewayEvent, GatewayEventKind, WebhookError, WebhookVerifier};
