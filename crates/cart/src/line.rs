use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_catalog::{ProductId, VariationId};
use storefront_core::{AggregateId, DomainError, DomainResult, ValueObject};

/// Composite identity of a cart line: a product plus its variation set.
///
/// Variation ids are kept sorted and deduplicated, so two keys are equal iff
/// they name the same product with the same set of variations, regardless of
/// the order the shopper picked them in.
///
/// The string form is `<product>` or `<product>_<v1>-<v2>...`, with each id in
/// 32-digit simple hex so the separators are unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineKey {
    product_id: ProductId,
    variation_ids: Vec<VariationId>,
}

impl ValueObject for LineKey {}

impl LineKey {
    pub fn new(product_id: ProductId, variation_ids: impl IntoIterator<Item = VariationId>) -> Self {
        let mut variation_ids: Vec<VariationId> = variation_ids.into_iter().collect();
        variation_ids.sort();
        variation_ids.dedup();
        Self {
            product_id,
            variation_ids,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn variation_ids(&self) -> &[VariationId] {
        &self.variation_ids
    }

    pub fn encode(&self) -> String {
        let mut out = self.product_id.0.as_uuid().simple().to_string();
        if !self.variation_ids.is_empty() {
            out.push('_');
            let parts: Vec<String> = self
                .variation_ids
                .iter()
                .map(|v| v.0.as_uuid().simple().to_string())
                .collect();
            out.push_str(&parts.join("-"));
        }
        out
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        let (product, variations) = match raw.split_once('_') {
            Some((p, v)) => (p, Some(v)),
            None => (raw, None),
        };
        let product_id = ProductId(parse_id(product)?);
        let variation_ids = match variations {
            Some(v) => v
                .split('-')
                .map(|part| parse_id(part).map(VariationId))
                .collect::<DomainResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self::new(product_id, variation_ids))
    }
}

fn parse_id(raw: &str) -> DomainResult<AggregateId> {
    if raw.len() != 32 {
        return Err(DomainError::invalid_id(format!("line key segment '{raw}'")));
    }
    Uuid::try_parse(raw)
        .map(AggregateId::from_uuid)
        .map_err(|e| DomainError::invalid_id(format!("line key segment '{raw}': {e}")))
}

impl core::fmt::Display for LineKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl core::str::FromStr for LineKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LineKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LineKey> for String {
    fn from(value: LineKey) -> Self {
        value.encode()
    }
}

/// One product-plus-variation-set entry with a quantity. Never carries a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: LineKey,
    pub quantity: u32,
}

impl CartLine {
    pub fn new(key: LineKey, quantity: u32) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        Ok(Self { key, quantity })
    }
}

/// Validate a shopper-supplied quantity for an add.
pub fn parse_quantity(raw: i64) -> DomainResult<u32> {
    if raw < 1 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    u32::try_from(raw).map_err(|_| DomainError::validation("quantity is too large"))
}
