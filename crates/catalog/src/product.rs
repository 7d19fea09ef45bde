use std::sync::Arc;

use serde::{Deserialize, Serialize};

use storefront_core::{AggregateId, DomainError, DomainResult, Money};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Variation identifier (a size, finish or fabric option of one product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariationId(pub AggregateId);

impl VariationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VariationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for VariationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A purchasable option on a product. `price_adjustment` may be negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub name: String,
    pub value: String,
    pub price_adjustment: Money,
    pub stock: u32,
    pub sku: String,
    pub is_active: bool,
}

impl Variation {
    /// Label shown on cart lines and order summaries ("Finish: Walnut").
    pub fn label(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

/// Catalog product as of the moment it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub sku: String,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: Money,
    /// Original price, for showing discounts.
    pub compare_at_price: Option<Money>,
    pub stock: u32,
    pub is_active: bool,
    pub variations: Vec<Variation>,
}

impl Product {
    pub fn variation(&self, id: VariationId) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Whole-number discount against `compare_at_price`, if any.
    pub fn discount_percentage(&self) -> Option<u8> {
        let compare = self.compare_at_price?;
        if compare <= self.price || !compare.is_positive() {
            return None;
        }
        let off = (compare - self.price).minor() * 100 / compare.minor();
        u8::try_from(off).ok()
    }

    /// Reject an add-to-cart that references this product in a state that
    /// cannot be charged: inactive product, or any variation that is
    /// unknown, belongs to another product, or is inactive.
    pub fn check_purchasable(&self, variation_ids: &[VariationId]) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::unavailable(format!(
                "product {} is not available",
                self.name
            )));
        }
        for id in variation_ids {
            match self.variation(*id) {
                Some(v) if v.is_active => {}
                Some(v) => {
                    return Err(DomainError::unavailable(format!(
                        "variation {} of {} is not available",
                        v.label(),
                        self.name
                    )));
                }
                None => {
                    return Err(DomainError::validation(format!(
                        "invalid product variation selected: {id}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Read-only catalog lookups.
pub trait Catalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<Product>;

    fn product_by_slug(&self, slug: &str) -> Option<Product>;

    fn variation(&self, product: ProductId, id: VariationId) -> Option<Variation> {
        self.product(product)?.variation(id).cloned()
    }
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn product(&self, id: ProductId) -> Option<Product> {
        (**self).product(id)
    }

    fn product_by_slug(&self, slug: &str) -> Option<Product> {
        (**self).product_by_slug(slug)
    }
}
