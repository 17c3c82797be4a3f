use std::sync::Arc;

use dropmart_core::{AggregateId, SupplierId};
use dropmart_orders::{SubOrder, SubOrderId, SubOrderStatus};
use dropmart_pickups::{
    ConfirmCollected, Manifest, OpenPickup, PICKUP_AGGREGATE_TYPE, Pickup, PickupCommand,
    PickupId, PickupMetadata,
};

use crate::clock::Clock;
use crate::command_dispatcher::{DispatchError, rehydrate};
use crate::event_store::StoredEvent;
use crate::projections::{PickupReadModel, ProjectionSet};
use crate::services::{SharedDispatcher, SharedStore};

/// The pickup batcher: groups ready sub-orders into one courier handoff.
///
/// Membership validation runs against rehydrated sub-order aggregates (the
/// authoritative state), not the read models — a half-synced projection must
/// never let a non-ready sub-order into a pickup.
pub struct PickupService {
    dispatcher: Arc<SharedDispatcher>,
    store: SharedStore,
    projections: Arc<ProjectionSet>,
    clock: Arc<dyn Clock>,
}

impl PickupService {
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

    /// Create a pickup from `sub_order_ids`, all-or-nothing.
    ///
    /// Every named sub-order must belong to `supplier_id` and currently be
    /// `pret_pour_enlevement`; otherwise the whole batch is rejected with an
    /// error naming each offender. Sub-order statuses are not touched —
    /// `livre` still goes through the state machine on delivery confirmation.
    pub fn create_pickup(
        &self,
        supplier_id: SupplierId,
        sub_order_ids: Vec<SubOrderId>,
        metadata: Option<PickupMetadata>,
    ) -> Result<PickupReadModel, DispatchError> {
        if sub_order_ids.is_empty() {
            return Err(DispatchError::Validation(
                "pickup must contain sub-orders".to_string(),
            ));
        }

        let mut offending: Vec<String> = Vec::new();
        for sub_order_id in &sub_order_ids {
            let (sub_order, _) = rehydrate::<_, SubOrder>(
                &self.store,
                supplier_id,
                sub_order_id.0,
                |_, aggregate_id| SubOrder::empty(SubOrderId::new(aggregate_id)),
            )?;
            if !sub_order.exists() {
                offending.push(format!(
                    "{sub_order_id}: not found for this supplier"
                ));
            } else if sub_order.status() != SubOrderStatus::ReadyForPickup {
                offending.push(format!(
                    "{sub_order_id}: status is {}, expected pret_pour_enlevement",
                    sub_order.status()
                ));
            }
        }
        if !offending.is_empty() {
            return Err(DispatchError::Validation(format!(
                "pickup rejected: {}",
                offending.join("; ")
            )));
        }

        let pickup_id = PickupId::new(AggregateId::new());
        let mut metadata = metadata.unwrap_or(PickupMetadata {
            package_count: 0,
            total_weight_kg: None,
        });
        if metadata.package_count == 0 {
            metadata.package_count = sub_order_ids.len() as u32;
        }

        let cmd = PickupCommand::OpenPickup(OpenPickup {
            supplier_id,
            pickup_id,
            code: pickup_code(pickup_id),
            metadata,
            sub_order_ids,
            occurred_at: self.clock.now(),
        });

        let committed = self.dispatcher.dispatch::<Pickup>(
            supplier_id,
            pickup_id.0,
            PICKUP_AGGREGATE_TYPE,
            cmd,
            |_, aggregate_id| Pickup::empty(PickupId::new(aggregate_id)),
        )?;
        self.apply_committed(&committed);

        tracing::info!(pickup_id = %pickup_id, "pickup created");

        self.projections
            .pickup_log
            .find(pickup_id)
            .ok_or(DispatchError::NotFound)
    }

    /// Mark the pickup as collected by the courier (idempotent).
    pub fn confirm_collected(&self, pickup_id: PickupId) -> Result<PickupReadModel, DispatchError> {
        let supplier_id = self
            .projections
            .pickup_log
            .supplier_of(pickup_id)
            .ok_or(DispatchError::NotFound)?;

        let cmd = PickupCommand::ConfirmCollected(ConfirmCollected {
            supplier_id,
            pickup_id,
            occurred_at: self.clock.now(),
        });
        let committed = self.dispatcher.dispatch::<Pickup>(
            supplier_id,
            pickup_id.0,
            PICKUP_AGGREGATE_TYPE,
            cmd,
            |_, aggregate_id| Pickup::empty(PickupId::new(aggregate_id)),
        )?;
        self.apply_committed(&committed);

        self.projections
            .pickup_log
            .find(pickup_id)
            .ok_or(DispatchError::NotFound)
    }

    /// Assemble the printable manifest for an existing pickup.
    pub fn manifest(&self, pickup_id: PickupId) -> Result<Manifest, DispatchError> {
        let supplier_id = self
            .projections
            .pickup_log
            .supplier_of(pickup_id)
            .ok_or(DispatchError::NotFound)?;

        let (pickup, _) = rehydrate::<_, Pickup>(
            &self.store,
            supplier_id,
            pickup_id.0,
            |_, aggregate_id| Pickup::empty(PickupId::new(aggregate_id)),
        )?;
        if !pickup.exists() {
            return Err(DispatchError::NotFound);
        }

        let mut sub_orders = Vec::with_capacity(pickup.sub_order_ids().len());
        for sub_order_id in pickup.sub_order_ids() {
            let (sub_order, _) = rehydrate::<_, SubOrder>(
                &self.store,
                supplier_id,
                sub_order_id.0,
                |_, aggregate_id| SubOrder::empty(SubOrderId::new(aggregate_id)),
            )?;
            sub_orders.push(sub_order);
        }

        Manifest::build(&pickup, &sub_orders).map_err(DispatchError::from)
    }

    pub fn get_pickup(&self, pickup_id: PickupId) -> Option<PickupReadModel> {
        self.projections.pickup_log.find(pickup_id)
    }

    fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            self.projections.apply(&stored.to_envelope());
        }
    }
}

/// Short human-readable code derived from the pickup id.
fn pickup_code(pickup_id: PickupId) -> String {
    let hex = pickup_id.0.as_uuid().simple().to_string();
    format!("PU-{}", hex[..6].to_uppercase())
}
