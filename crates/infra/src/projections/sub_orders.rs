use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use dropmart_core::{AggregateId, ResellerId, SupplierId};
use dropmart_events::EventEnvelope;
use dropmart_orders::{
    ClientInfo, OrderId, SUB_ORDER_AGGREGATE_TYPE, SubOrderEvent, SubOrderId, SubOrderLine,
    SubOrderStatus, TrackingEntry,
};
use dropmart_pickups::{PICKUP_AGGREGATE_TYPE, PickupEvent, PickupId};

use crate::read_model::SupplierStore;

/// Queryable sub-order ledger row: current status, money facts, audit trail.
///
/// This is the row the financial aggregator and the supplier worklist read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderReadModel {
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub reseller_id: ResellerId,
    pub client: ClientInfo,
    pub lines: Vec<SubOrderLine>,
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub profit: Decimal,
    pub status: SubOrderStatus,
    pub delivery_attempts: u32,
    /// Back-reference resolved by projection, never a live object graph.
    pub pickup_id: Option<PickupId>,
    pub tracking: Vec<TrackingEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stream version after the last applied event — what a caller echoes
    /// back as `expected_version` on its next transition request.
    pub version: u64,
}

/// Supplier+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    supplier_id: SupplierId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum SubOrderProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("supplier isolation violation: {0}")]
    SupplierIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Sub-order ledger projection.
///
/// Consumes published envelopes (JSON payloads) from the sub-order streams,
/// plus pickup streams to resolve the sub-order → pickup back-reference.
/// Read models are disposable and rebuildable from the event store.
#[derive(Debug)]
pub struct SubOrderLedgerProjection<S>
where
    S: SupplierStore<SubOrderId, SubOrderReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    /// Which supplier owns which sub-order, so callers holding only a
    /// sub-order id can locate its stream.
    supplier_index: RwLock<HashMap<SubOrderId, SupplierId>>,
}

impl<S> SubOrderLedgerProjection<S>
where
    S: SupplierStore<SubOrderId, SubOrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            supplier_index: RwLock::new(HashMap::new()),
        }
    }

    /// Query the read model for one supplier/sub-order.
    pub fn get(&self, supplier_id: SupplierId, sub_order_id: &SubOrderId) -> Option<SubOrderReadModel> {
        self.store.get(supplier_id, sub_order_id)
    }

    /// Supplier worklist (disposable read model).
    pub fn list(&self, supplier_id: SupplierId) -> Vec<SubOrderReadModel> {
        self.store.list(supplier_id)
    }

    /// Locate the owning supplier of a sub-order.
    pub fn supplier_of(&self, sub_order_id: SubOrderId) -> Option<SupplierId> {
        self.supplier_index.read().ok()?.get(&sub_order_id).copied()
    }

    /// Lookup by sub-order id alone.
    pub fn find(&self, sub_order_id: SubOrderId) -> Option<SubOrderReadModel> {
        let supplier_id = self.supplier_of(sub_order_id)?;
        self.get(supplier_id, &sub_order_id)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces supplier isolation
    /// - Enforces monotonic sequence per (supplier, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SubOrderProjectionError> {
        match envelope.aggregate_type() {
            SUB_ORDER_AGGREGATE_TYPE => self.apply_sub_order(envelope),
            PICKUP_AGGREGATE_TYPE => self.apply_pickup(envelope),
            _ => Ok(()),
        }
    }

    fn apply_sub_order(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SubOrderProjectionError> {
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
        if !check_cursor(&cursors, key, seq)? {
            return Ok(());
        }

        let event: SubOrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SubOrderProjectionError::Deserialize(e.to_string()))?;

        match event {
            SubOrderEvent::SubOrderOpened(e) => {
                if e.supplier_id != supplier_id {
                    return Err(SubOrderProjectionError::SupplierIsolation(
                        "event supplier_id does not match envelope supplier_id".to_string(),
                    ));
                }
                if e.sub_order_id.0 != aggregate_id {
                    return Err(SubOrderProjectionError::SupplierIsolation(
                        "event sub_order_id does not match envelope aggregate_id".to_string(),
                    ));
                }

                let total =
                    e.lines.iter().map(|l| l.line_total()).sum::<Decimal>() + e.delivery_fee;
                let profit = e.lines.iter().map(|l| l.line_profit()).sum();

                self.store.upsert(
                    supplier_id,
                    e.sub_order_id,
                    SubOrderReadModel {
                        sub_order_id: e.sub_order_id,
                        order_id: e.order_id,
                        supplier_id,
                        reseller_id: e.reseller_id,
                        client: e.client.clone(),
                        lines: e.lines.clone(),
                        delivery_fee: e.delivery_fee,
                        platform_fee: e.platform_fee,
                        total,
                        profit,
                        status: SubOrderStatus::Unconfirmed,
                        delivery_attempts: 0,
                        pickup_id: None,
                        tracking: vec![TrackingEntry {
                            status: SubOrderStatus::Unconfirmed,
                            actor: e.actor,
                            description: None,
                            delivery_attempts: 0,
                            occurred_at: e.occurred_at,
                        }],
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        version: seq,
                    },
                );

                if let Ok(mut index) = self.supplier_index.write() {
                    index.insert(e.sub_order_id, supplier_id);
                }
            }
            SubOrderEvent::StatusRecorded(e) => {
                match self.store.get(supplier_id, &e.sub_order_id) {
                    Some(mut model) => {
                        model.status = e.new_status;
                        if e.failed_attempt {
                            model.delivery_attempts += 1;
                        }
                        model.tracking.push(TrackingEntry {
                            status: e.new_status,
                            actor: e.actor,
                            description: e.description.clone(),
                            delivery_attempts: model.delivery_attempts,
                            occurred_at: e.occurred_at,
                        });
                        model.updated_at = e.occurred_at;
                        model.version = seq;
                        self.store.upsert(supplier_id, e.sub_order_id, model);
                    }
                    None => {
                        tracing::warn!(
                            sub_order_id = %e.sub_order_id,
                            "status recorded for unknown sub-order read model"
                        );
                    }
                }
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_pickup(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SubOrderProjectionError> {
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
        if !check_cursor(&cursors, key, seq)? {
            return Ok(());
        }

        let event: PickupEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SubOrderProjectionError::Deserialize(e.to_string()))?;

        if let PickupEvent::PickupOpened(e) = event {
            for sub_order_id in &e.sub_order_ids {
                if let Some(mut model) = self.store.get(supplier_id, sub_order_id) {
                    model.pickup_id = Some(e.pickup_id);
                    self.store.upsert(supplier_id, *sub_order_id, model);
                }
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }
}

/// Shared cursor discipline: `Ok(true)` to proceed, `Ok(false)` to skip a
/// replayed envelope, error on sequence corruption.
fn check_cursor(
    cursors: &HashMap<CursorKey, u64>,
    key: CursorKey,
    seq: u64,
) -> Result<bool, SubOrderProjectionError> {
    let last = *cursors.get(&key).unwrap_or(&0);

    if seq == 0 {
        return Err(SubOrderProjectionError::NonMonotonicSequence { last, found: seq });
    }
    if seq <= last {
        // Duplicate or replay; safe to ignore.
        return Ok(false);
    }
    if seq != last + 1 && last != 0 {
        // First event may land at any positive sequence (rebuilds from a
        // snapshot); afterwards increments must be strict.
        return Err(SubOrderProjectionError::NonMonotonicSequence { last, found: seq });
    }
    Ok(true)
}
