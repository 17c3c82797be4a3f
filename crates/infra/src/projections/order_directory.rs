use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use dropmart_events::EventEnvelope;
use dropmart_orders::{
    Order, OrderId, SUB_ORDER_AGGREGATE_TYPE, SubOrderEvent, SubOrderSummary,
};

#[derive(Debug, Error)]
pub enum OrderDirectoryError {
    #[error("failed to deserialize sub-order event: {0}")]
    Deserialize(String),
}

/// Cart-level order directory.
///
/// Sub-orders reference their parent order by id only; this projection is the
/// indexed back-reference that reassembles a reseller's cart view from the
/// `SubOrderOpened` events scattered across supplier streams. Unlike the
/// other read models it is keyed by order, not supplier: an order naturally
/// spans suppliers.
#[derive(Debug, Default)]
pub struct OrderDirectoryProjection {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl OrderDirectoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        self.orders.read().ok()?.get(&order_id).cloned()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderDirectoryError> {
        if envelope.aggregate_type() != SUB_ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: SubOrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderDirectoryError::Deserialize(e.to_string()))?;

        let SubOrderEvent::SubOrderOpened(e) = event else {
            return Ok(());
        };

        let total = e.lines.iter().map(|l| l.line_total()).sum::<Decimal>() + e.delivery_fee;

        let Ok(mut orders) = self.orders.write() else {
            return Ok(());
        };
        let order = orders.entry(e.order_id).or_insert_with(|| Order {
            id: e.order_id,
            reseller_id: e.reseller_id,
            client: e.client.clone(),
            created_at: e.occurred_at,
            sub_orders: Vec::new(),
        });

        // Replays deliver the same opened event twice; membership is a set.
        if !order
            .sub_orders
            .iter()
            .any(|s| s.sub_order_id == e.sub_order_id)
        {
            order.sub_orders.push(SubOrderSummary {
                sub_order_id: e.sub_order_id,
                supplier_id: e.supplier_id,
                total,
            });
        }

        Ok(())
    }
}
