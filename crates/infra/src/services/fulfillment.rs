use std::sync::Arc;

use uuid::Uuid;

use dropmart_catalog::{PRODUCT_AGGREGATE_TYPE, Product, ProductCommand, ProductId, ReleaseStock};
use dropmart_core::{Actor, ExpectedVersion, SupplierId};
use dropmart_orders::{
    Order, OrderId, RecordTransition, SUB_ORDER_AGGREGATE_TYPE, SubOrder, SubOrderCommand,
    SubOrderId, SubOrderStatus, transition_rule,
};

use crate::clock::Clock;
use crate::command_dispatcher::{DispatchError, rehydrate};
use crate::event_store::StoredEvent;
use crate::projections::{ProjectionSet, SubOrderReadModel};
use crate::services::{MAX_CONFLICT_RETRIES, SharedDispatcher, SharedStore, with_conflict_retry};

/// Drives the sub-order state machine and couples the two stock-releasing
/// terminals (`retourne`, `annule`) to the stock ledger.
///
/// Ordering inside one transition:
/// 1. pure validation (an `InvalidTransition` aborts before stock is touched)
/// 2. append the transition at the caller's expected version (the commit
///    point — a `Conflict` aborts before stock is touched)
/// 3. release the reserved line quantities (idempotent, bounded retries)
pub struct FulfillmentService {
    dispatcher: Arc<SharedDispatcher>,
    store: SharedStore,
    projections: Arc<ProjectionSet>,
    clock: Arc<dyn Clock>,
}

impl FulfillmentService {
    pub fn new(
        dispatcher: Arc<SharedDispatcher>,
        store: SharedStore,
        projections: Arc<ProjectionSet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            projections,
            clock,
        }
    }

    /// Apply one lifecycle transition.
    ///
    /// `expected_version` is the stream version the caller last read; a stale
    /// value fails with `Conflict` and the caller must re-read and retry.
    /// Replaying an already-applied `idempotency_key` returns the current
    /// state without appending anything.
    pub fn transition(
        &self,
        sub_order_id: SubOrderId,
        new_status: SubOrderStatus,
        actor: Actor,
        description: Option<String>,
        idempotency_key: Uuid,
        expected_version: u64,
    ) -> Result<SubOrderReadModel, DispatchError> {
        let supplier_id = self
            .projections
            .sub_orders
            .supplier_of(sub_order_id)
            .ok_or(DispatchError::NotFound)?;

        let (sub_order, _) = rehydrate::<_, SubOrder>(
            &self.store,
            supplier_id,
            sub_order_id.0,
            |_, aggregate_id| SubOrder::empty(SubOrderId::new(aggregate_id)),
        )?;
        if !sub_order.exists() {
            return Err(DispatchError::NotFound);
        }

        // Idempotent replay: the request was already applied; hand back the
        // result without a version check or a duplicate tracking record.
        if sub_order.has_applied(idempotency_key) {
            return self
                .projections
                .sub_orders
                .find(sub_order_id)
                .ok_or(DispatchError::NotFound);
        }

        let previous_status = sub_order.status();

        let cmd = SubOrderCommand::RecordTransition(RecordTransition {
            supplier_id,
            sub_order_id,
            new_status,
            actor,
            description,
            idempotency_key,
            occurred_at: self.clock.now(),
        });

        let committed = self.dispatcher.dispatch_expecting::<SubOrder>(
            supplier_id,
            sub_order_id.0,
            SUB_ORDER_AGGREGATE_TYPE,
            cmd,
            ExpectedVersion::Exact(expected_version),
            |_, aggregate_id| SubOrder::empty(SubOrderId::new(aggregate_id)),
        )?;
        self.apply_committed(&committed);

        tracing::info!(
            sub_order_id = %sub_order_id,
            from = %previous_status,
            to = %new_status,
            actor = %actor,
            "sub-order transition committed"
        );

        // Cancellation/return gives every reserved line quantity back.
        if let Some(rule) = transition_rule(previous_status, new_status) {
            if rule.releases_stock {
                self.release_lines(&sub_order, supplier_id)?;
            }
        }

        self.projections
            .sub_orders
            .find(sub_order_id)
            .ok_or(DispatchError::NotFound)
    }

    pub fn get_sub_order(&self, sub_order_id: SubOrderId) -> Option<SubOrderReadModel> {
        self.projections.sub_orders.find(sub_order_id)
    }

    pub fn list_sub_orders(&self, supplier_id: SupplierId) -> Vec<SubOrderReadModel> {
        self.projections.sub_orders.list(supplier_id)
    }

    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.projections.order_directory.get(order_id)
    }

    fn release_lines(
        &self,
        sub_order: &SubOrder,
        supplier_id: SupplierId,
    ) -> Result<(), DispatchError> {
        let now = self.clock.now();
        let reference = sub_order.id_typed().0;

        for line in sub_order.lines() {
            let committed = with_conflict_retry(MAX_CONFLICT_RETRIES, || {
                self.dispatcher.dispatch::<Product>(
                    supplier_id,
                    line.product_id.0,
                    PRODUCT_AGGREGATE_TYPE,
                    ProductCommand::ReleaseStock(ReleaseStock {
                        supplier_id,
                        product_id: line.product_id,
                        variation_id: line.variation_id,
                        quantity: line.quantity,
                        reference,
                        occurred_at: now,
                    }),
                    |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
                )
            })
            .inspect_err(|err| {
                // Reservation stays open on the product aggregate; an
                // integrity sweep can re-drive the release.
                tracing::error!(
                    product_id = %line.product_id,
                    error = ?err,
                    "failed to release stock after terminal transition"
                );
            })?;
            self.apply_committed(&committed);
        }

        Ok(())
    }

    fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            self.projections.apply(&stored.to_envelope());
        }
    }
}
