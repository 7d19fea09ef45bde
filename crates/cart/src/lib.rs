//! `storefront-cart`: cart lines and Price Resolution.
//!
//! Pure domain code: line identity, the session cart blob format, and the
//! single place catalog data is turned into prices. Storage lives in
//! `storefront-infra`.

pub mod line;
pub mod owner;
pub mod pricing;
pub mod session;

pub use line::{CartLine, LineKey, parse_quantity};
pub use owner::CartOwner;
pub use pricing::{
    PricedLine, Resolution, ResolvedCart, SkipReason, SkippedLine, cart_total, line_subtotal,
    resolve_line, unit_price,
};
pub use session::{SessionCart, SessionEntry};
