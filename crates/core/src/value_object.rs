//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes. In this
/// workspace that covers amounts (`Money`), rates (`TaxRate`), line keys and
/// address snapshots: anything copied into an order by value rather than
/// referenced by id.
///
/// ```ignore
/// let a = Money::from_minor(100);
/// let b = Money::from_minor(100);
/// assert_eq!(a, b); // equal by value
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
