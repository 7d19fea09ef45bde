//! Cart-to-order snapshot.
//!
//! Turns resolved cart lines and validated checkout details into a
//! [`PlaceOrder`] command. Names, SKUs and prices are copied by value here,
//! so later catalog edits never reach a placed order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_cart::ResolvedCart;
use storefront_core::{CustomerId, DomainError, DomainResult, Money, TaxRate};

use crate::order::{Address, OrderId, OrderItem, OrderNumber, OrderTotals, PlaceOrder, Purchaser};

pub const DEFAULT_COUNTRY: &str = "United States";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl AddressInput {
    fn is_blank(&self) -> bool {
        [&self.street, &self.city, &self.state, &self.postal_code]
            .iter()
            .all(|f| f.trim().is_empty())
    }

    fn validate(self, which: &str) -> DomainResult<Address> {
        let street = required(self.street, &format!("{which}_street"))?;
        let city = required(self.city, &format!("{which}_city"))?;
        let state = required(self.state, &format!("{which}_state"))?;
        let postal_code = required(self.postal_code, &format!("{which}_postal_code"))?;
        let country = self
            .country
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
        Ok(Address {
            street,
            city,
            state,
            postal_code,
            country,
        })
    }
}

/// Checkout form as submitted by the shopper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDetails {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub shipping: AddressInput,
    #[serde(default)]
    pub billing: Option<AddressInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Checkout details that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDetails {
    pub purchaser: Purchaser,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub notes: String,
}

impl CheckoutDetails {
    pub fn validate(self) -> DomainResult<ValidatedDetails> {
        let email = required(self.email, "email")?;
        let valid_email = email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(DomainError::validation("email: enter a valid email address"));
        }

        let purchaser = Purchaser {
            email,
            first_name: required(self.first_name, "first_name")?,
            last_name: required(self.last_name, "last_name")?,
            phone: required(self.phone, "phone")?,
        };
        let shipping_address = self.shipping.validate("shipping")?;
        let billing_address = match self.billing {
            Some(b) if !b.is_blank() => Some(b.validate("billing")?),
            _ => None,
        };

        Ok(ValidatedDetails {
            purchaser,
            shipping_address,
            billing_address,
            notes: self.notes.unwrap_or_default().trim().to_string(),
        })
    }
}

fn required(value: String, field: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field}: this field is required")));
    }
    Ok(value.to_string())
}

/// Build the order placement command from a resolved cart.
///
/// `tax = tax_rate(subtotal)` and `total = subtotal + tax + shipping_cost`.
#[allow(clippy::too_many_arguments)]
pub fn snapshot_command(
    order_id: OrderId,
    order_number: OrderNumber,
    customer_id: Option<CustomerId>,
    details: ValidatedDetails,
    cart: &ResolvedCart,
    tax_rate: TaxRate,
    shipping_cost: Money,
    occurred_at: DateTime<Utc>,
) -> DomainResult<PlaceOrder> {
    if cart.is_empty() {
        return Err(DomainError::validation("cart is empty"));
    }

    let items: Vec<OrderItem> = cart
        .lines
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            product_sku: line.product_sku.clone(),
            variation_ids: line.key.variation_ids().to_vec(),
            variation_labels: line.variations.iter().map(|v| v.label()).collect(),
            quantity: line.quantity,
            price: line.unit_price,
            subtotal: line.unit_price.times(line.quantity),
        })
        .collect();

    let subtotal: Money = items.iter().map(|i| i.subtotal).sum();
    let totals = OrderTotals::new(subtotal, tax_rate.tax_on(subtotal), shipping_cost);

    Ok(PlaceOrder {
        order_id,
        order_number,
        customer_id,
        purchaser: details.purchaser,
        shipping_address: details.shipping_address,
        billing_address: details.billing_address,
        notes: details.notes,
        items,
        totals,
        occurred_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use proptest::prelude::*;
    use storefront_cart::{CartLine, LineKey};
    use storefront_catalog::{Catalog, Product, ProductId, Variation, VariationId};
    use storefront_core::AggregateId;

    use crate::order::Order;

    #[derive(Default)]
    struct MapCatalog(HashMap<ProductId, Product>);

    impl Catalog for MapCatalog {
        fn product(&self, id: ProductId) -> Option<Product> {
            self.0.get(&id).cloned()
        }

        fn product_by_slug(&self, slug: &str) -> Option<Product> {
            self.0.values().find(|p| p.slug == slug).cloned()
        }
    }

    fn product(name: &str, price: i64, variations: Vec<Variation>) -> Product {
        Product {
            id: ProductId::new(AggregateId::new()),
            slug: name.to_lowercase(),
            sku: format!("SKU-{name}"),
            name: name.to_string(),
            price: Money::from_minor(price),
            compare_at_price: None,
            stock: 10,
            is_active: true,
            variations,
        }
    }

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            email: "grace@example.com".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            phone: "555-0199".to_string(),
            shipping: AddressInput {
                street: "12 Elm St".to_string(),
                city: "Arlington".to_string(),
                state: "VA".to_string(),
                postal_code: "22201".to_string(),
                country: None,
            },
            billing: None,
            notes: Some("  leave at the door ".to_string()),
        }
    }

    fn example_cart() -> (MapCatalog, Vec<CartLine>) {
        let a = product("A", 1_000, vec![]);
        let vb = Variation {
            id: VariationId::new(AggregateId::new()),
            name: "Finish".to_string(),
            value: "Walnut".to_string(),
            price_adjustment: Money::from_minor(500),
            stock: 2,
            sku: String::new(),
            is_active: true,
        };
        let b = product("B", 2_500, vec![vb.clone()]);
        let lines = vec![
            CartLine::new(LineKey::new(a.id, []), 2).unwrap(),
            CartLine::new(LineKey::new(b.id, [vb.id]), 1).unwrap(),
        ];
        let mut catalog = MapCatalog::default();
        catalog.0.insert(a.id, a);
        catalog.0.insert(b.id, b);
        (catalog, lines)
    }

    fn place(catalog: &MapCatalog, lines: &[CartLine]) -> PlaceOrder {
        let resolved = ResolvedCart::resolve(catalog, lines);
        snapshot_command(
            OrderId::new(AggregateId::new()),
            OrderNumber::generate(),
            None,
            details().validate().unwrap(),
            &resolved,
            TaxRate::default(),
            Money::ZERO,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn example_cart_freezes_to_fifty_five() {
        let (catalog, lines) = example_cart();
        let cmd = place(&catalog, &lines);

        assert_eq!(cmd.totals.subtotal, Money::from_minor(5_000));
        assert_eq!(cmd.totals.tax, Money::from_minor(500));
        assert_eq!(cmd.totals.shipping_cost, Money::ZERO);
        assert_eq!(cmd.totals.total, Money::from_minor(5_500));
        assert_eq!(cmd.items.len(), 2);
        assert_eq!(cmd.items[0].subtotal, Money::from_minor(2_000));
        assert_eq!(cmd.items[1].subtotal, Money::from_minor(3_000));
        assert_eq!(cmd.items[1].variation_labels, vec!["Finish: Walnut".to_string()]);
        assert_eq!(cmd.shipping_address.country, DEFAULT_COUNTRY);
        assert_eq!(cmd.notes, "leave at the door");

        assert!(Order::place(cmd).is_ok());
    }

    #[test]
    fn catalog_edits_after_snapshot_do_not_reach_the_order() {
        let (mut catalog, lines) = example_cart();
        let (order, _) = Order::place(place(&catalog, &lines)).unwrap();

        for p in catalog.0.values_mut() {
            p.price = Money::from_minor(99_999);
            p.name = "Renamed".to_string();
        }
        catalog.0.clear();

        assert_eq!(order.items()[0].product_name, "A");
        assert_eq!(order.items()[0].price, Money::from_minor(1_000));
        assert_eq!(order.totals().total, Money::from_minor(5_500));
    }

    #[test]
    fn empty_cart_yields_no_command() {
        let catalog = MapCatalog::default();
        let resolved = ResolvedCart::resolve(&catalog, &[]);
        let got = snapshot_command(
            OrderId::new(AggregateId::new()),
            OrderNumber::generate(),
            None,
            details().validate().unwrap(),
            &resolved,
            TaxRate::default(),
            Money::ZERO,
            Utc::now(),
        );
        assert!(got.is_err());
    }

    #[test]
    fn required_fields_are_enforced() {
        let mut d = details();
        d.email = "not-an-email".to_string();
        assert!(d.validate().is_err());

        let mut d = details();
        d.phone = "   ".to_string();
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("phone"));

        let mut d = details();
        d.shipping.city.clear();
        assert!(d.validate().is_err());
    }

    #[test]
    fn blank_billing_is_dropped_partial_billing_is_rejected() {
        let mut d = details();
        d.billing = Some(AddressInput::default());
        assert_eq!(d.validate().unwrap().billing_address, None);

        let mut d = details();
        d.billing = Some(AddressInput {
            street: "3 Oak Ave".to_string(),
            ..AddressInput::default()
        });
        assert!(d.validate().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn placed_totals_always_add_up(
            prices in prop::collection::vec((1i64..200_000, 1u32..20), 1..8),
            bps in 0u32..3_000,
            shipping in 0i64..5_000,
        ) {
            let mut catalog = MapCatalog::default();
            let mut lines = Vec::new();
            for (price, qty) in prices {
                let p = product("P", price, vec![]);
                lines.push(CartLine::new(LineKey::new(p.id, []), qty).unwrap());
                catalog.0.insert(p.id, p);
            }
            let resolved = ResolvedCart::resolve(&catalog, &lines);
            let cmd = snapshot_command(
                OrderId::new(AggregateId::new()),
                OrderNumber::generate(),
                None,
                details().validate().unwrap(),
                &resolved,
                TaxRate::from_basis_points(bps),
                Money::from_minor(shipping),
                Utc::now(),
            ).unwrap();
            let t = cmd.totals;
            prop_assert_eq!(t.total, t.subtotal + t.tax + t.shipping_cost);
            prop_assert_eq!(t.subtotal, resolved.subtotal());
            prop_assert!(Order::place(cmd).is_ok());
        }
    }
}
