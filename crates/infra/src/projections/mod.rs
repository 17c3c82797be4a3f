//! Disposable read models built from published event envelopes.
//!
//! Every projection is idempotent (per-stream cursor tracking) so
//! at-least-once delivery and replays are safe, and every read model can be
//! dropped and rebuilt from the event store at any time.

pub mod order_directory;
pub mod pickup_log;
pub mod stock_levels;
pub mod sub_orders;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use dropmart_events::EventEnvelope;

pub use order_directory::OrderDirectoryProjection;
pub use pickup_log::{PickupLogProjection, PickupReadModel};
pub use stock_levels::{ProductStockLevels, StockLevelsProjection, VariationStockLevel};
pub use sub_orders::{SubOrderLedgerProjection, SubOrderReadModel};

use crate::read_model::InMemorySupplierStore;

use dropmart_catalog::ProductId;
use dropmart_orders::SubOrderId;
use dropmart_pickups::PickupId;

pub type SharedSubOrderLedger =
    SubOrderLedgerProjection<Arc<InMemorySupplierStore<SubOrderId, SubOrderReadModel>>>;
pub type SharedStockLevels =
    StockLevelsProjection<Arc<InMemorySupplierStore<ProductId, ProductStockLevels>>>;
pub type SharedPickupLog =
    PickupLogProjection<Arc<InMemorySupplierStore<PickupId, PickupReadModel>>>;

/// All read models of the pipeline, fed from one envelope source.
///
/// Duplicated deliveries are fine: each projection skips envelopes at or
/// below its per-stream cursor, so feeding the set both synchronously (after
/// dispatch) and from a bus subscription converges to the same state.
pub struct ProjectionSet {
    pub sub_orders: Arc<SharedSubOrderLedger>,
    pub stock_levels: Arc<SharedStockLevels>,
    pub pickup_log: Arc<SharedPickupLog>,
    pub order_directory: Arc<OrderDirectoryProjection>,
}

impl ProjectionSet {
    pub fn in_memory() -> Self {
        Self {
            sub_orders: Arc::new(SubOrderLedgerProjection::new(Arc::new(
                InMemorySupplierStore::new(),
            ))),
            stock_levels: Arc::new(StockLevelsProjection::new(Arc::new(
                InMemorySupplierStore::new(),
            ))),
            pickup_log: Arc::new(PickupLogProjection::new(Arc::new(
                InMemorySupplierStore::new(),
            ))),
            order_directory: Arc::new(OrderDirectoryProjection::new()),
        }
    }

    /// Fan one envelope out to every projection.
    ///
    /// Projection failures are logged, not propagated: the write path has
    /// already committed, and a read model can always be rebuilt.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Err(e) = self.sub_orders.apply_envelope(envelope) {
            tracing::warn!(error = ?e, "sub-order ledger projection rejected envelope");
        }
        if let Err(e) = self.stock_levels.apply_envelope(envelope) {
            tracing::warn!(error = ?e, "stock levels projection rejected envelope");
        }
        if let Err(e) = self.pickup_log.apply_envelope(envelope) {
            tracing::warn!(error = ?e, "pickup log projection rejected envelope");
        }
        if let Err(e) = self.order_directory.apply_envelope(envelope) {
            tracing::warn!(error = ?e, "order directory projection rejected envelope");
        }
    }
}
