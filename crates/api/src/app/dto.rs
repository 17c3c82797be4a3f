use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// POST /products
#[derive(Debug, Deserialize)]
pub struct DefineProductRequest {
    pub name: String,
    /// Wholesale price for variationless products.
    #[serde(default)]
    pub wholesale_price: Option<Decimal>,
    /// Initial stock for variationless products.
    #[serde(default)]
    pub initial_stock: Option<i64>,
    #[serde(default)]
    pub variations: Vec<DefineVariationRequest>,
}

#[derive(Debug, Deserialize)]
pub struct DefineVariationRequest {
    pub label: String,
    pub wholesale_price: Decimal,
    pub initial_stock: i64,
}

/// POST /products/:id/replenish
#[derive(Debug, Deserialize)]
pub struct ReplenishRequest {
    #[serde(default)]
    pub variation_id: Option<String>,
    pub quantity: i64,
}

/// POST /checkout
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub client: ClientRequest,
    pub lines: Vec<CheckoutLineRequest>,
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub platform_fee: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutLineRequest {
    pub product_id: String,
    #[serde(default)]
    pub variation_id: Option<String>,
    pub quantity: i64,
    pub unit_sale_price: Decimal,
}

/// POST /sub-orders/:id/transition
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub new_status: String,
    #[serde(default)]
    pub description: Option<String>,
    pub idempotency_key: Uuid,
    pub expected_version: u64,
}

/// POST /pickups
#[derive(Debug, Deserialize)]
pub struct CreatePickupRequest {
    pub sub_order_ids: Vec<String>,
    #[serde(default)]
    pub package_count: Option<u32>,
    #[serde(default)]
    pub total_weight_kg: Option<Decimal>,
}

/// GET /suppliers/:id/financials
#[derive(Debug, Deserialize)]
pub struct FinancialsQuery {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}
