use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use dropmart_catalog::{PRODUCT_AGGREGATE_TYPE, ProductEvent, ProductId, VariationId};
use dropmart_core::{AggregateId, SupplierId};
use dropmart_events::EventEnvelope;

use crate::read_model::SupplierStore;

/// Non-authoritative stock counters for display.
///
/// The product aggregate stays authoritative for reservations; this view is
/// what catalog pages and low-stock dashboards read without touching the
/// write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStockLevels {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
    pub variations: Vec<VariationStockLevel>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationStockLevel {
    pub variation_id: VariationId,
    pub label: String,
    pub stock: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    supplier_id: SupplierId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize product event: {0}")]
    Deserialize(String),

    #[error("supplier isolation violation: {0}")]
    SupplierIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock levels projection over the catalog product streams.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: SupplierStore<ProductId, ProductStockLevels>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    supplier_index: RwLock<HashMap<ProductId, SupplierId>>,
}

impl<S> StockLevelsProjection<S>
where
    S: SupplierStore<ProductId, ProductStockLevels>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            supplier_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, supplier_id: SupplierId, product_id: &ProductId) -> Option<ProductStockLevels> {
        self.store.get(supplier_id, product_id)
    }

    pub fn list(&self, supplier_id: SupplierId) -> Vec<ProductStockLevels> {
        self.store.list(supplier_id)
    }

    /// Locate the owning supplier of a product — how checkout resolves a
    /// cart line's product id into a stream to reserve against.
    pub fn supplier_of(&self, product_id: ProductId) -> Option<SupplierId> {
        self.supplier_index.read().ok()?.get(&product_id).copied()
    }

    pub fn find(&self, product_id: ProductId) -> Option<ProductStockLevels> {
        let supplier_id = self.supplier_of(product_id)?;
        self.get(supplier_id, &product_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE_TYPE {
            return Ok(());
        }

        let supplier_id = envelope.supplier_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let key = CursorKey {
            supplier_id,
            aggregate_id,
        };
        let last = *cursors.get(&key).unwrap_or(&0);
        if seq == 0 {
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        let (event_supplier, product_id) = match &event {
            ProductEvent::ProductDefined(e) => (e.supplier_id, e.product_id),
            ProductEvent::StockReserved(e) => (e.supplier_id, e.product_id),
            ProductEvent::StockReleased(e) => (e.supplier_id, e.product_id),
            ProductEvent::StockReplenished(e) => (e.supplier_id, e.product_id),
        };
        if event_supplier != supplier_id {
            return Err(StockProjectionError::SupplierIsolation(
                "event supplier_id does not match envelope supplier_id".to_string(),
            ));
        }
        if product_id.0 != aggregate_id {
            return Err(StockProjectionError::SupplierIsolation(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            ProductEvent::ProductDefined(e) => {
                let variations: Vec<VariationStockLevel> = e
                    .variations
                    .iter()
                    .map(|spec| VariationStockLevel {
                        variation_id: spec.variation_id,
                        label: spec.label.clone(),
                        stock: spec.initial_stock,
                    })
                    .collect();
                let stock = if variations.is_empty() {
                    e.initial_stock
                } else {
                    variations.iter().map(|v| v.stock).sum()
                };
                self.store.upsert(
                    supplier_id,
                    e.product_id,
                    ProductStockLevels {
                        product_id: e.product_id,
                        name: e.name.clone(),
                        stock,
                        variations,
                        version: seq,
                    },
                );
                if let Ok(mut index) = self.supplier_index.write() {
                    index.insert(e.product_id, supplier_id);
                }
            }
            ProductEvent::StockReserved(e) => {
                self.adjust(supplier_id, e.product_id, e.variation_id, -e.quantity, seq);
            }
            ProductEvent::StockReleased(e) => {
                self.adjust(supplier_id, e.product_id, e.variation_id, e.quantity, seq);
            }
            ProductEvent::StockReplenished(e) => {
                self.adjust(supplier_id, e.product_id, e.variation_id, e.quantity, seq);
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }

    fn adjust(
        &self,
        supplier_id: SupplierId,
        product_id: ProductId,
        variation_id: Option<VariationId>,
        delta: i64,
        seq: u64,
    ) {
        let Some(mut model) = self.store.get(supplier_id, &product_id) else {
            tracing::warn!(%product_id, "stock adjustment for unknown product read model");
            return;
        };

        match variation_id {
            Some(vid) => {
                if let Some(var) = model.variations.iter_mut().find(|v| v.variation_id == vid) {
                    var.stock += delta;
                }
                model.stock = model.variations.iter().map(|v| v.stock).sum();
            }
            None => {
                model.stock += delta;
            }
        }
        model.version = seq;
        self.store.upsert(supplier_id, product_id, model);
    }
}
