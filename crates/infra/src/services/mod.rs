//! Application services: the operations the HTTP layer calls.

pub mod cart;
pub mod checkout;
pub mod settlement;

pub use cart::{CartError, CartService, CartView, MergeReport};
pub use checkout::{CheckoutError, CheckoutPreview, CheckoutService, CheckoutSettings, CheckoutStarted, PlacedOrder};
pub use settlement::{ReturnOutcome, SettlementError, SettlementOutcome, SettlementService};
