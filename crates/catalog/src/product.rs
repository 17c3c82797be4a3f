use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dropmart_core::{Aggregate, AggregateId, AggregateRoot, DomainError, SupplierId};
use dropmart_events::Event;

/// Stream type identifier for product aggregates.
pub const PRODUCT_AGGREGATE_TYPE: &str = "catalog.product";

/// Product identifier (supplier-scoped via `supplier_id` fields in events/commands).
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

/// Variation identifier (unique within its product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
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

/// Variation definition as supplied at product creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationSpec {
    pub variation_id: VariationId,
    /// Human label, e.g. "Rouge / XL".
    pub label: String,
    pub wholesale_price: Decimal,
    pub initial_stock: i64,
}

/// Variation state: attributes + its own stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub label: String,
    pub wholesale_price: Decimal,
    pub stock: i64,
}

/// Key of an open reservation: which sub-order reserved which counter.
///
/// Tracking reservations by reference is what bounds releases — a release can
/// never return more stock than this sub-order actually reserved, and a
/// second full release finds no reservation and becomes a no-op.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReservationKey {
    pub reference: AggregateId,
    pub variation_id: Option<VariationId>,
}

/// Aggregate root: Product (authoritative stock ledger entry).
///
/// Stock invariant maintained by `apply`:
/// - with variations: `stock == Σ variation.stock`
/// - without variations: `stock` is authoritative on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    supplier_id: Option<SupplierId>,
    name: String,
    /// Unit wholesale price for products without variations.
    wholesale_price: Decimal,
    stock: i64,
    variations: Vec<Variation>,
    reservations: HashMap<ReservationKey, i64>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            supplier_id: None,
            name: String::new(),
            wholesale_price: Decimal::ZERO,
            stock: 0,
            variations: Vec::new(),
            reservations: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn variation(&self, id: VariationId) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Quantity currently reserved under `reference` for the given counter.
    pub fn reserved(&self, reference: AggregateId, variation_id: Option<VariationId>) -> i64 {
        let key = ReservationKey {
            reference,
            variation_id,
        };
        *self.reservations.get(&key).unwrap_or(&0)
    }

    /// Wholesale unit price for the targeted counter.
    pub fn wholesale_price_for(&self, variation_id: Option<VariationId>) -> Option<Decimal> {
        match variation_id {
            Some(vid) => self.variation(vid).map(|v| v.wholesale_price),
            None => {
                if self.variations.is_empty() {
                    Some(self.wholesale_price)
                } else {
                    None
                }
            }
        }
    }

    /// Stock invariant check, exposed for tests and integrity sweeps.
    pub fn stock_invariant_holds(&self) -> bool {
        if self.variations.is_empty() {
            self.stock >= 0
        } else {
            self.stock >= 0
                && self.variations.iter().all(|v| v.stock >= 0)
                && self.stock == self.variations.iter().map(|v| v.stock).sum::<i64>()
        }
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DefineProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineProduct {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub name: String,
    /// Wholesale price for products without variations.
    pub wholesale_price: Decimal,
    /// Initial stock for products without variations (ignored otherwise).
    pub initial_stock: i64,
    pub variations: Vec<VariationSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (atomic decrement, fails on insufficient counter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    /// The sub-order this reservation belongs to.
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (atomic increment, bounded by the open reservation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplenishStock (supplier-side restock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishStock {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    DefineProduct(DefineProduct),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    ReplenishStock(ReplenishStock),
}

impl dropmart_events::Command for ProductCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            ProductCommand::DefineProduct(c) => c.product_id.0,
            ProductCommand::ReserveStock(c) => c.product_id.0,
            ProductCommand::ReleaseStock(c) => c.product_id.0,
            ProductCommand::ReplenishStock(c) => c.product_id.0,
        }
    }
}

/// Event: ProductDefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDefined {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub name: String,
    pub wholesale_price: Decimal,
    pub initial_stock: i64,
    pub variations: Vec<VariationSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub reference: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReplenished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReplenished {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductDefined(ProductDefined),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    StockReplenished(StockReplenished),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductDefined(_) => "catalog.product.defined",
            ProductEvent::StockReserved(_) => "catalog.product.stock_reserved",
            ProductEvent::StockReleased(_) => "catalog.product.stock_released",
            ProductEvent::StockReplenished(_) => "catalog.product.stock_replenished",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductDefined(e) => e.occurred_at,
            ProductEvent::StockReserved(e) => e.occurred_at,
            ProductEvent::StockReleased(e) => e.occurred_at,
            ProductEvent::StockReplenished(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductDefined(e) => {
                self.id = e.product_id;
                self.supplier_id = Some(e.supplier_id);
                self.name = e.name.clone();
                self.wholesale_price = e.wholesale_price;
                self.variations = e
                    .variations
                    .iter()
                    .map(|spec| Variation {
                        id: spec.variation_id,
                        label: spec.label.clone(),
                        wholesale_price: spec.wholesale_price,
                        stock: spec.initial_stock,
                    })
                    .collect();
                self.stock = if self.variations.is_empty() {
                    e.initial_stock
                } else {
                    self.variations.iter().map(|v| v.stock).sum()
                };
                self.reservations.clear();
                self.created = true;
            }
            ProductEvent::StockReserved(e) => {
                self.adjust_counter(e.variation_id, -e.quantity);
                let key = ReservationKey {
                    reference: e.reference,
                    variation_id: e.variation_id,
                };
                *self.reservations.entry(key).or_insert(0) += e.quantity;
            }
            ProductEvent::StockReleased(e) => {
                self.adjust_counter(e.variation_id, e.quantity);
                let key = ReservationKey {
                    reference: e.reference,
                    variation_id: e.variation_id,
                };
                if let Some(remaining) = self.reservations.get_mut(&key) {
                    *remaining -= e.quantity;
                    if *remaining <= 0 {
                        self.reservations.remove(&key);
                    }
                }
            }
            ProductEvent::StockReplenished(e) => {
                self.adjust_counter(e.variation_id, e.quantity);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::DefineProduct(cmd) => self.handle_define(cmd),
            ProductCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            ProductCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            ProductCommand::ReplenishStock(cmd) => self.handle_replenish(cmd),
        }
    }
}

impl Product {
    /// Move one counter and re-derive the product-level aggregate counter.
    fn adjust_counter(&mut self, variation_id: Option<VariationId>, delta: i64) {
        match variation_id {
            Some(vid) => {
                if let Some(var) = self.variations.iter_mut().find(|v| v.id == vid) {
                    var.stock += delta;
                }
                self.stock = self.variations.iter().map(|v| v.stock).sum();
            }
            None => {
                self.stock += delta;
            }
        }
    }

    fn ensure_supplier(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.supplier_id != Some(supplier_id) {
            return Err(DomainError::invariant("supplier mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    /// Resolve the counter a command targets, erroring on malformed targeting.
    fn targeted_available(&self, variation_id: Option<VariationId>) -> Result<i64, DomainError> {
        match variation_id {
            Some(vid) => match self.variation(vid) {
                Some(var) => Ok(var.stock),
                None => Err(DomainError::validation(format!(
                    "unknown variation {vid} for product {}",
                    self.id
                ))),
            },
            None => {
                if self.variations.is_empty() {
                    Ok(self.stock)
                } else {
                    Err(DomainError::validation(format!(
                        "product {} has variations; a variation_id is required",
                        self.id
                    )))
                }
            }
        }
    }

    fn handle_define(&self, cmd: &DefineProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.wholesale_price < Decimal::ZERO {
            return Err(DomainError::validation("wholesale_price cannot be negative"));
        }
        if cmd.variations.is_empty() && cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial_stock cannot be negative"));
        }
        for spec in &cmd.variations {
            if spec.label.trim().is_empty() {
                return Err(DomainError::validation("variation label cannot be empty"));
            }
            if spec.initial_stock < 0 {
                return Err(DomainError::validation(format!(
                    "variation {} initial_stock cannot be negative",
                    spec.variation_id
                )));
            }
            if spec.wholesale_price < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "variation {} wholesale_price cannot be negative",
                    spec.variation_id
                )));
            }
        }
        let mut seen = Vec::with_capacity(cmd.variations.len());
        for spec in &cmd.variations {
            if seen.contains(&spec.variation_id) {
                return Err(DomainError::validation(format!(
                    "duplicate variation id {}",
                    spec.variation_id
                )));
            }
            seen.push(spec.variation_id);
        }

        Ok(vec![ProductEvent::ProductDefined(ProductDefined {
            supplier_id: cmd.supplier_id,
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            wholesale_price: cmd.wholesale_price,
            initial_stock: cmd.initial_stock,
            variations: cmd.variations.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_supplier(cmd.supplier_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let available = self.targeted_available(cmd.variation_id)?;
        if cmd.quantity > available {
            let target = match cmd.variation_id {
                Some(vid) => format!("product {} variation {vid}", self.id),
                None => format!("product {}", self.id),
            };
            return Err(DomainError::insufficient_stock(format!(
                "{target}: requested {requested}, available {available}",
                requested = cmd.quantity,
            )));
        }

        Ok(vec![ProductEvent::StockReserved(StockReserved {
            supplier_id: cmd.supplier_id,
            product_id: cmd.product_id,
            variation_id: cmd.variation_id,
            quantity: cmd.quantity,
            reference: cmd.reference,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_supplier(cmd.supplier_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let key = ReservationKey {
            reference: cmd.reference,
            variation_id: cmd.variation_id,
        };
        let reserved = match self.reservations.get(&key) {
            // Nothing (or no longer anything) reserved under this reference:
            // the release already happened. No-op keeps releases idempotent.
            None => return Ok(vec![]),
            Some(r) => *r,
        };

        if cmd.quantity > reserved {
            return Err(DomainError::invariant(format!(
                "release exceeds reserved quantity for reference {}: requested {}, reserved {reserved}",
                cmd.reference, cmd.quantity
            )));
        }

        Ok(vec![ProductEvent::StockReleased(StockReleased {
            supplier_id: cmd.supplier_id,
            product_id: cmd.product_id,
            variation_id: cmd.variation_id,
            quantity: cmd.quantity,
            reference: cmd.reference,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replenish(&self, cmd: &ReplenishStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_supplier(cmd.supplier_id)?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        // Validate targeting; replenish never fails on amount.
        self.targeted_available(cmd.variation_id)?;

        Ok(vec![ProductEvent::StockReplenished(StockReplenished {
            supplier_id: cmd.supplier_id,
            product_id: cmd.product_id,
            variation_id: cmd.variation_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}
