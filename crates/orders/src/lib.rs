//! `storefront-orders`: orders and the cart-to-order snapshot.

pub mod order;
pub mod snapshot;

pub use order::{
    AcceptOrder, Address, Order, OrderAccepted, OrderCommand, OrderEvent, OrderId, OrderItem,
    OrderNumber, OrderPlaced, OrderStatus, OrderTotals, PlaceOrder, Purchaser,
};
pub use snapshot::{CheckoutDetails, AddressInput, ValidatedDetails, snapshot_command};
