use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use storefront_cart::{CartLine, CartOwner, LineKey, PricedLine, ResolvedCart, SkippedLine, parse_quantity};
use storefront_catalog::{Catalog, ProductId, VariationId};
use storefront_core::{CustomerId, DomainError, Money, SessionId};

use crate::cart_store::CartStore;
use crate::locks::OwnerLocks;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Priced cart contents as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<PricedLine>,
    pub skipped: Vec<SkippedLine>,
    pub item_count: u64,
    pub total: Money,
    pub warnings: Vec<String>,
}

impl CartView {
    fn from_resolved(resolved: ResolvedCart) -> Self {
        Self {
            item_count: resolved.item_count(),
            total: resolved.subtotal(),
            warnings: resolved.warnings(),
            lines: resolved.lines,
            skipped: resolved.skipped,
        }
    }
}

/// Result of folding a session cart into a customer cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Session lines combined with an existing customer line.
    pub combined: usize,
    /// Session lines inserted as new customer lines.
    pub inserted: usize,
    /// Session lines dropped because the product no longer exists.
    pub skipped: usize,
    /// Session lines that could not be written.
    pub failed: usize,
}

/// Cart operations over both backings.
#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn Catalog>,
    sessions: Arc<dyn CartStore>,
    customers: Arc<dyn CartStore>,
    locks: Arc<OwnerLocks>,
}

impl CartService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        sessions: Arc<dyn CartStore>,
        customers: Arc<dyn CartStore>,
        locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            catalog,
            sessions,
            customers,
            locks,
        }
    }

    pub(crate) fn store_for(&self, owner: &CartOwner) -> &dyn CartStore {
        match owner {
            CartOwner::Session(_) => self.sessions.as_ref(),
            CartOwner::Customer(_) => self.customers.as_ref(),
        }
    }

    pub(crate) fn locks(&self) -> &OwnerLocks {
        &self.locks
    }

    pub(crate) fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Add `quantity` of a product/variation set. Rejects unknown or inactive
    /// products, and variations that are unknown, belong elsewhere or are
    /// inactive.
    pub fn add(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        quantity: i64,
        variation_ids: Vec<VariationId>,
    ) -> Result<LineKey, CartError> {
        let quantity = parse_quantity(quantity)?;
        let product = self
            .catalog
            .product(product_id)
            .ok_or(DomainError::not_found("product"))?;
        product.check_purchasable(&variation_ids)?;

        let key = LineKey::new(product_id, variation_ids);
        self.locks
            .with_locked(&[*owner], || self.store_for(owner).add(owner, &key, quantity))?;
        Ok(key)
    }

    /// Set a line's quantity. `<= 0` removes the line.
    pub fn update(&self, owner: &CartOwner, key: &LineKey, quantity: i64) -> Result<(), CartError> {
        let quantity = if quantity <= 0 {
            0
        } else {
            u32::try_from(quantity).map_err(|_| DomainError::validation("quantity is too large"))?
        };
        self.locks
            .with_locked(&[*owner], || self.store_for(owner).set_quantity(owner, key, quantity))?;
        Ok(())
    }

    pub fn remove(&self, owner: &CartOwner, key: &LineKey) -> Result<(), CartError> {
        self.locks
            .with_locked(&[*owner], || self.store_for(owner).remove(owner, key))?;
        Ok(())
    }

    pub fn clear(&self, owner: &CartOwner) -> Result<(), CartError> {
        self.locks
            .with_locked(&[*owner], || self.store_for(owner).clear(owner))?;
        Ok(())
    }

    pub fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, CartError> {
        Ok(self.store_for(owner).lines(owner)?)
    }

    /// Resolve every line against the catalog, logging the ones that no
    /// longer resolve.
    pub fn resolve(&self, owner: &CartOwner) -> Result<ResolvedCart, CartError> {
        let lines = self.lines(owner)?;
        let resolved = ResolvedCart::resolve(self.catalog.as_ref(), &lines);
        log_skipped(owner, &resolved.skipped);
        Ok(resolved)
    }

    pub fn view(&self, owner: &CartOwner) -> Result<CartView, CartError> {
        Ok(CartView::from_resolved(self.resolve(owner)?))
    }

    /// Sum of line subtotals; lines that do not resolve are skipped.
    pub fn total(&self, owner: &CartOwner) -> Result<Money, CartError> {
        Ok(self.resolve(owner)?.subtotal())
    }

    /// Sum of stored quantities (the header badge count).
    pub fn item_count(&self, owner: &CartOwner) -> Result<u64, CartError> {
        Ok(self.lines(owner)?.iter().map(|l| u64::from(l.quantity)).sum())
    }

    /// Fold an anonymous session cart into the customer's cart at login.
    ///
    /// Quantities add up on matching keys; lines whose product is gone are
    /// dropped. The session cart is cleared at the end whatever happened to
    /// individual lines.
    pub fn merge(&self, session: SessionId, customer: CustomerId) -> Result<MergeReport, CartError> {
        let from = CartOwner::Session(session);
        let into = CartOwner::Customer(customer);

        self.locks.with_locked(&[from, into], || {
            let lines = self.sessions.lines(&from)?;
            let existing: Vec<LineKey> = self
                .customers
                .lines(&into)?
                .into_iter()
                .map(|l| l.key)
                .collect();

            let mut report = MergeReport::default();
            for line in lines {
                if self.catalog.product(line.key.product_id()).is_none() {
                    warn!(owner = %from, line_key = %line.key, "merge skipped line for missing product");
                    report.skipped += 1;
                    continue;
                }
                match self.customers.add(&into, &line.key, line.quantity) {
                    Ok(()) if existing.contains(&line.key) => report.combined += 1,
                    Ok(()) => report.inserted += 1,
                    Err(e) => {
                        warn!(owner = %into, line_key = %line.key, error = %e, "merge failed to write line");
                        report.failed += 1;
                    }
                }
            }

            self.sessions.clear(&from)?;
            info!(
                session = %session,
                customer = %customer,
                combined = report.combined,
                inserted = report.inserted,
                skipped = report.skipped,
                failed = report.failed,
                "session cart merged"
            );
            Ok(report)
        })
    }
}

pub(crate) fn log_skipped(owner: &CartOwner, skipped: &[SkippedLine]) {
    for s in skipped {
        warn!(owner = %owner, line_key = %s.key, reason = %s.reason, "cart line skipped");
    }
}
