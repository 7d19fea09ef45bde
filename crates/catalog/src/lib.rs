//! Product catalog as seen by the checkout core.
//!
//! The catalog is owned elsewhere (admin backend); carts and orders only read
//! it. This crate holds the read model and the lookup contract.

pub mod product;

pub use product::{Catalog, Product, ProductId, Variation, VariationId};
