use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dropmart_catalog::{ProductId, VariationId};
use dropmart_core::{AggregateId, DomainError, ResellerId, SupplierId, ValueObject};

use crate::sub_order::SubOrderId;

/// Cart-level order identifier.
///
/// The order itself is not an event stream: it is persisted as the set of
/// `SubOrderOpened` events that share this id, and reassembled by the order
/// directory read model.
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

/// End-client snapshot captured at checkout (name, phone, delivery address).
///
/// A snapshot, not a reference: later edits to the client's profile must not
/// rewrite historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

impl ValueObject for ClientInfo {}

impl ClientInfo {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("client phone cannot be empty"));
        }
        if self.address.trim().is_empty() {
            return Err(DomainError::validation("client address cannot be empty"));
        }
        Ok(())
    }
}

/// One line of a reseller's cart, as submitted at checkout.
///
/// The sale price is the reseller's agreed price; the wholesale price is
/// resolved from the catalog by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub unit_sale_price: Decimal,
}

/// A reseller's cart: the input of the checkout splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutCart {
    pub reseller_id: ResellerId,
    pub client: ClientInfo,
    pub lines: Vec<CheckoutLine>,
    /// Flat courier fee applied to each resulting sub-order.
    pub delivery_fee: Decimal,
    /// Platform commission withheld per sub-order.
    pub platform_fee: Decimal,
}

impl CheckoutCart {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.client.validate()?;
        if self.lines.is_empty() {
            return Err(DomainError::validation("cart cannot be empty"));
        }
        for line in &self.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "product {}: quantity must be positive",
                    line.product_id
                )));
            }
            if line.unit_sale_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "product {}: unit_sale_price cannot be negative",
                    line.product_id
                )));
            }
        }
        if self.delivery_fee < Decimal::ZERO {
            return Err(DomainError::validation("delivery_fee cannot be negative"));
        }
        if self.platform_fee < Decimal::ZERO {
            return Err(DomainError::validation("platform_fee cannot be negative"));
        }
        Ok(())
    }
}

/// One supplier-scoped slice of an order, as seen from the cart level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderSummary {
    pub sub_order_id: SubOrderId,
    pub supplier_id: SupplierId,
    pub total: Decimal,
}

/// The assembled cart-level order returned by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub reseller_id: ResellerId,
    pub client: ClientInfo,
    pub created_at: DateTime<Utc>,
    pub sub_orders: Vec<SubOrderSummary>,
}

impl Order {
    pub fn total(&self) -> Decimal {
        self.sub_orders.iter().map(|s| s.total).sum()
    }
}
