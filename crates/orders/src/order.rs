use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_catalog::{ProductId, VariationId};
use storefront_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Money, ValueObject};
use storefront_events::Event;

/// Internal order identifier. Never shown to shoppers; see [`OrderNumber`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Externally visible order number: `ORD-` followed by 12 upper-case hex
/// digits drawn from a random UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    const PREFIX: &'static str = "ORD-";

    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        Self(format!("{}{}", Self::PREFIX, &hex[..12]))
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let valid = raw
            .strip_prefix(Self::PREFIX)
            .is_some_and(|rest| {
                rest.len() == 12 && rest.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            });
        if !valid {
            return Err(DomainError::invalid_id(format!("order number '{raw}'")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}

/// Order status lifecycle.
///
/// `new → accepted` happens on confirmed payment. `completed` and `cancelled`
/// are set by staff outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Accepted,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchaser contact details, copied at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchaser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

impl Purchaser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Postal address, copied by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ValueObject for Address {}

/// Frozen order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_sku: String,
    pub variation_ids: Vec<VariationId>,
    /// `"Finish: Walnut"` style labels of the chosen variations.
    pub variation_labels: Vec<String>,
    pub quantity: u32,
    /// Unit price in smallest currency unit (e.g., cents).
    pub price: Money,
    pub subtotal: Money,
}

/// Monetary totals, frozen at creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
}

impl OrderTotals {
    pub fn new(subtotal: Money, tax: Money, shipping_cost: Money) -> Self {
        Self {
            subtotal,
            tax,
            shipping_cost,
            total: subtotal + tax + shipping_cost,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping_cost
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: Option<OrderNumber>,
    customer_id: Option<CustomerId>,
    purchaser: Option<Purchaser>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    notes: String,
    items: Vec<OrderItem>,
    totals: OrderTotals,
    status: OrderStatus,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: None,
            customer_id: None,
            purchaser: None,
            shipping_address: None,
            billing_address: None,
            notes: String::new(),
            items: Vec::new(),
            totals: OrderTotals::new(Money::ZERO, Money::ZERO, Money::ZERO),
            status: OrderStatus::New,
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    /// Decide and apply a `PlaceOrder` in one step.
    pub fn place(cmd: PlaceOrder) -> Result<(Self, OrderEvent), DomainError> {
        let mut order = Self::empty(cmd.order_id);
        let mut events = order.handle(&OrderCommand::PlaceOrder(cmd))?;
        let event = events
            .pop()
            .ok_or_else(|| DomainError::invariant("placing an order produced no event"))?;
        order.apply(&event);
        Ok((order, event))
    }

    /// Decide then apply. An empty result means the outcome was already
    /// recorded.
    pub fn execute(&mut self, command: &OrderCommand) -> Result<Vec<OrderEvent>, DomainError> {
        let events = self.handle(command)?;
        for e in &events {
            self.apply(e);
        }
        Ok(events)
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_placed(&self) -> bool {
        self.order_number.is_some()
    }

    /// Order number; empty until placed.
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn purchaser(&self) -> Option<&Purchaser> {
        self.purchaser.as_ref()
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Plain-text summary used in confirmation emails.
    pub fn summary(&self) -> String {
        let mut out = String::from("Items:\n");
        for item in &self.items {
            out.push_str(&format!(
                "- {} x{} - ${} each\n",
                item.product_name, item.quantity, item.price
            ));
        }
        out.push_str(&format!(
            "\nSubtotal: ${}\nTax: ${}\nShipping: ${}\nTotal: ${}\n",
            self.totals.subtotal, self.totals.tax, self.totals.shipping_cost, self.totals.total
        ));
        out
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: Option<CustomerId>,
    pub purchaser: Purchaser,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub notes: String,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptOrder (payment confirmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    AcceptOrder(AcceptOrder),
}

/// Event: OrderPlaced. Carries the full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: Option<CustomerId>,
    pub purchaser: Purchaser,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub notes: String,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAccepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderAccepted(OrderAccepted),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderAccepted(_) => "orders.order.accepted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderAccepted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = Some(e.order_number.clone());
                self.customer_id = e.customer_id;
                self.purchaser = Some(e.purchaser.clone());
                self.shipping_address = Some(e.shipping_address.clone());
                self.billing_address = e.billing_address.clone();
                self.notes = e.notes.clone();
                self.items = e.items.clone();
                self.totals = e.totals;
                self.status = OrderStatus::New;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            OrderEvent::OrderAccepted(e) => {
                self.status = OrderStatus::Accepted;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::AcceptOrder(cmd) => self.handle_accept(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.is_placed() {
            return Err(DomainError::conflict("order already placed"));
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.items.is_empty() {
            return Err(DomainError::validation("cannot place an order without items"));
        }
        for item in &cmd.items {
            if item.quantity == 0 {
                return Err(DomainError::invariant("order item quantity must be positive"));
            }
            if item.subtotal != item.price.times(item.quantity) {
                return Err(DomainError::invariant(format!(
                    "item {} subtotal does not equal price * quantity",
                    item.product_name
                )));
            }
        }
        let items_total: Money = cmd.items.iter().map(|i| i.subtotal).sum();
        if items_total != cmd.totals.subtotal {
            return Err(DomainError::invariant("subtotal does not match the sum of items"));
        }
        if !cmd.totals.is_consistent() {
            return Err(DomainError::invariant("total must equal subtotal + tax + shipping"));
        }
        if cmd.totals.total.to_gateway_amount().is_err() {
            return Err(DomainError::validation("order total cannot be negative"));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            customer_id: cmd.customer_id,
            purchaser: cmd.purchaser.clone(),
            shipping_address: cmd.shipping_address.clone(),
            billing_address: cmd.billing_address.clone(),
            notes: cmd.notes.clone(),
            items: cmd.items.clone(),
            totals: cmd.totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Only `new` orders move. Accepting twice, or accepting an order staff
    /// already completed or cancelled, records nothing.
    fn handle_accept(&self, cmd: &AcceptOrder) -> Result<Vec<OrderEvent>, DomainError> {
        let Some(number) = &self.order_number else {
            return Err(DomainError::not_found("order"));
        };
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::New {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::OrderAccepted(OrderAccepted {
            order_id: cmd.order_id,
            order_number: number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    #[cfg(test)]
    fn set_status_by_staff(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.updated_at = Some(at);
            self.version += 1;
        }
    }
}
