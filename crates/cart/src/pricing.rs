//! Price Resolution.
//!
//! Every price the storefront shows or charges comes from here: cart totals,
//! the checkout preview and order snapshots all resolve lines through
//! [`resolve_line`], and the arithmetic is integer minor units end to end.

use serde::{Deserialize, Serialize};

use storefront_catalog::{Catalog, Product, ProductId, Variation, VariationId};
use storefront_core::Money;

use crate::line::{CartLine, LineKey};

/// `product_price + Σ adjustments`.
pub fn unit_price<I>(product_price: Money, adjustments: I) -> Money
where
    I: IntoIterator<Item = Money>,
{
    product_price + adjustments.into_iter().sum::<Money>()
}

/// `(product_price + Σ adjustments) * quantity`.
pub fn line_subtotal<I>(product_price: Money, adjustments: I, quantity: u32) -> Money
where
    I: IntoIterator<Item = Money>,
{
    unit_price(product_price, adjustments).times(quantity)
}

/// Sum of line subtotals.
pub fn cart_total<'a, I>(lines: I) -> Money
where
    I: IntoIterator<Item = &'a PricedLine>,
{
    lines.into_iter().map(|l| l.subtotal).sum()
}

/// A cart line priced against the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub key: LineKey,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_sku: String,
    pub product_slug: String,
    pub variations: Vec<Variation>,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl PricedLine {
    fn from_catalog(key: LineKey, product: Product, variations: Vec<Variation>, quantity: u32) -> Self {
        let unit = unit_price(product.price, variations.iter().map(|v| v.price_adjustment));
        Self {
            key,
            product_id: product.id,
            product_name: product.name,
            product_sku: product.sku,
            product_slug: product.slug,
            variations,
            quantity,
            unit_price: unit,
            subtotal: unit.times(quantity),
        }
    }
}

/// Why a line could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "variation_id", rename_all = "snake_case")]
pub enum SkipReason {
    ProductMissing,
    ProductUnavailable,
    VariationUnavailable(VariationId),
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SkipReason::ProductMissing => f.write_str("product no longer exists"),
            SkipReason::ProductUnavailable => f.write_str("product is no longer available"),
            SkipReason::VariationUnavailable(id) => write!(f, "variation {id} is no longer available"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub key: LineKey,
    pub quantity: u32,
    pub reason: SkipReason,
}

impl SkippedLine {
    /// Shopper-facing warning.
    pub fn warning(&self) -> String {
        format!("An item was removed from your order: {}", self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Priced(PricedLine),
    Skipped(SkippedLine),
}

/// Price one line against the catalog.
///
/// Lines whose product has disappeared or was deactivated, or whose
/// variations are gone or were deactivated, are reported as skipped rather
/// than failing.
pub fn resolve_line<C>(catalog: &C, line: &CartLine) -> Resolution
where
    C: Catalog + ?Sized,
{
    let skipped = |reason| {
        Resolution::Skipped(SkippedLine {
            key: line.key.clone(),
            quantity: line.quantity,
            reason,
        })
    };

    let Some(product) = catalog.product(line.key.product_id()) else {
        return skipped(SkipReason::ProductMissing);
    };
    if !product.is_active {
        return skipped(SkipReason::ProductUnavailable);
    }

    let mut variations = Vec::with_capacity(line.key.variation_ids().len());
    for id in line.key.variation_ids() {
        match product.variation(*id) {
            Some(v) if v.is_active => variations.push(v.clone()),
            _ => return skipped(SkipReason::VariationUnavailable(*id)),
        }
    }

    Resolution::Priced(PricedLine::from_catalog(line.key.clone(), product, variations, line.quantity))
}

/// A whole cart resolved line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCart {
    pub lines: Vec<PricedLine>,
    pub skipped: Vec<SkippedLine>,
}

impl ResolvedCart {
    pub fn resolve<C>(catalog: &C, lines: &[CartLine]) -> Self
    where
        C: Catalog + ?Sized,
    {
        let mut out = Self::default();
        for line in lines {
            match resolve_line(catalog, line) {
                Resolution::Priced(p) => out.lines.push(p),
                Resolution::Skipped(s) => out.skipped.push(s),
            }
        }
        out
    }

    pub fn subtotal(&self) -> Money {
        cart_total(&self.lines)
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.skipped.iter().map(SkippedLine::warning).collect()
    }
}
