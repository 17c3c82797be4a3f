use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use dropmart_core::{AggregateId, SupplierId};
use dropmart_events::EventEnvelope;
use dropmart_orders::SubOrderId;
use dropmart_pickups::{PICKUP_AGGREGATE_TYPE, PickupEvent, PickupId, PickupStatus};

use crate::read_model::SupplierStore;

/// Queryable pickup row: membership snapshot + collection status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupReadModel {
    pub pickup_id: PickupId,
    pub supplier_id: SupplierId,
    pub code: String,
    pub status: PickupStatus,
    pub package_count: u32,
    pub total_weight_kg: Option<Decimal>,
    pub sub_order_ids: Vec<SubOrderId>,
    pub created_at: DateTime<Utc>,
    pub collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    supplier_id: SupplierId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum PickupProjectionError {
    #[error("failed to deserialize pickup event: {0}")]
    Deserialize(String),

    #[error("supplier isolation violation: {0}")]
    SupplierIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Pickup log projection (the financial aggregator's pickups count source).
#[derive(Debug)]
pub struct PickupLogProjection<S>
where
    S: SupplierStore<PickupId, PickupReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    supplier_index: RwLock<HashMap<PickupId, SupplierId>>,
}

impl<S> PickupLogProjection<S>
where
    S: SupplierStore<PickupId, PickupReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            supplier_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, supplier_id: SupplierId, pickup_id: &PickupId) -> Option<PickupReadModel> {
        self.store.get(supplier_id, pickup_id)
    }

    pub fn list(&self, supplier_id: SupplierId) -> Vec<PickupReadModel> {
        self.store.list(supplier_id)
    }

    pub fn supplier_of(&self, pickup_id: PickupId) -> Option<SupplierId> {
        self.supplier_index.read().ok()?.get(&pickup_id).copied()
    }

    pub fn find(&self, pickup_id: PickupId) -> Option<PickupReadModel> {
        let supplier_id = self.supplier_of(pickup_id)?;
        self.get(supplier_id, &pickup_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), PickupProjectionError> {
        if envelope.aggregate_type() != PICKUP_AGGREGATE_TYPE {
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
            return Err(PickupProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(PickupProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: PickupEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| PickupProjectionError::Deserialize(e.to_string()))?;

        match event {
            PickupEvent::PickupOpened(e) => {
                if e.supplier_id != supplier_id {
                    return Err(PickupProjectionError::SupplierIsolation(
                        "event supplier_id does not match envelope supplier_id".to_string(),
                    ));
                }
                if e.pickup_id.0 != aggregate_id {
                    return Err(PickupProjectionError::SupplierIsolation(
                        "event pickup_id does not match envelope aggregate_id".to_string(),
                    ));
                }

                self.store.upsert(
                    supplier_id,
                    e.pickup_id,
                    PickupReadModel {
                        pickup_id: e.pickup_id,
                        supplier_id,
                        code: e.code.clone(),
                        status: PickupStatus::AwaitingCourier,
                        package_count: e.metadata.package_count,
                        total_weight_kg: e.metadata.total_weight_kg,
                        sub_order_ids: e.sub_order_ids.clone(),
                        created_at: e.occurred_at,
                        collected_at: None,
                    },
                );
                if let Ok(mut index) = self.supplier_index.write() {
                    index.insert(e.pickup_id, supplier_id);
                }
            }
            PickupEvent::PickupCollected(e) => match self.store.get(supplier_id, &e.pickup_id) {
                Some(mut model) => {
                    model.status = PickupStatus::Collected;
                    model.collected_at = Some(e.occurred_at);
                    self.store.upsert(supplier_id, e.pickup_id, model);
                }
                None => {
                    tracing::warn!(
                        pickup_id = %e.pickup_id,
                        "collection recorded for unknown pickup read model"
                    );
                }
            },
        }

        cursors.insert(key, seq);
        Ok(())
    }
}
