use std::collections::HashMap;
use std::sync::RwLock;

use storefront_catalog::{Catalog, Product, ProductId};

/// In-memory product catalog for dev and tests. Edits and removals take
/// effect immediately for every cart that references the product.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, product: Product) {
        if let Ok(mut map) = self.products.write() {
            map.insert(product.id, product);
        }
    }

    pub fn remove(&self, id: ProductId) -> Option<Product> {
        self.products.write().ok()?.remove(&id)
    }

    pub fn list(&self) -> Vec<Product> {
        let Ok(map) = self.products.read() else {
            return vec![];
        };
        let mut out: Vec<Product> = map.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<Product> {
        self.products.read().ok()?.get(&id).cloned()
    }

    fn product_by_slug(&self, slug: &str) -> Option<Product> {
        self.products
            .read()
            .ok()?
            .values()
            .find(|p| p.slug == slug)
            .cloned()
    }
}
