use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dropmart_core::{Aggregate, AggregateId, AggregateRoot, DomainError, SupplierId};
use dropmart_events::Event;
use dropmart_orders::SubOrderId;

/// Stream type identifier for pickup aggregates.
pub const PICKUP_AGGREGATE_TYPE: &str = "fulfillment.pickup";

/// Pickup identifier (supplier-scoped via `supplier_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickupId(pub AggregateId);

impl PickupId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PickupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Pickup lifecycle: created while waiting for the courier, then collected.
///
/// A collected pickup is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    AwaitingCourier,
    Collected,
}

impl core::fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PickupStatus::AwaitingCourier => f.write_str("awaiting_courier"),
            PickupStatus::Collected => f.write_str("collected"),
        }
    }
}

/// Courier-facing metadata for the physical handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupMetadata {
    pub package_count: u32,
    pub total_weight_kg: Option<Decimal>,
}

/// Aggregate root: Pickup.
///
/// Membership is a snapshot of sub-order ids taken at creation; creating a
/// pickup never mutates the sub-orders themselves — handing to the courier is
/// distinct from delivering to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pickup {
    id: PickupId,
    supplier_id: Option<SupplierId>,
    code: String,
    metadata: PickupMetadata,
    sub_order_ids: Vec<SubOrderId>,
    status: PickupStatus,
    created_at: Option<DateTime<Utc>>,
    collected_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Pickup {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PickupId) -> Self {
        Self {
            id,
            supplier_id: None,
            code: String::new(),
            metadata: PickupMetadata {
                package_count: 0,
                total_weight_kg: None,
            },
            sub_order_ids: Vec::new(),
            status: PickupStatus::AwaitingCourier,
            created_at: None,
            collected_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PickupId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn metadata(&self) -> &PickupMetadata {
        &self.metadata
    }

    pub fn sub_order_ids(&self) -> &[SubOrderId] {
        &self.sub_order_ids
    }

    pub fn status(&self) -> PickupStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.collected_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Pickup {
    type Id = PickupId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenPickup (batch creation from a validated snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPickup {
    pub supplier_id: SupplierId,
    pub pickup_id: PickupId,
    /// Short human code printed on the manifest (e.g. "PU-3F2A9C").
    pub code: String,
    pub metadata: PickupMetadata,
    pub sub_order_ids: Vec<SubOrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmCollected (courier picked the batch up).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmCollected {
    pub supplier_id: SupplierId,
    pub pickup_id: PickupId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupCommand {
    OpenPickup(OpenPickup),
    ConfirmCollected(ConfirmCollected),
}

impl dropmart_events::Command for PickupCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            PickupCommand::OpenPickup(c) => c.pickup_id.0,
            PickupCommand::ConfirmCollected(c) => c.pickup_id.0,
        }
    }
}

/// Event: PickupOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupOpened {
    pub supplier_id: SupplierId,
    pub pickup_id: PickupId,
    pub code: String,
    pub metadata: PickupMetadata,
    pub sub_order_ids: Vec<SubOrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickupCollected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupCollected {
    pub supplier_id: SupplierId,
    pub pickup_id: PickupId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupEvent {
    PickupOpened(PickupOpened),
    PickupCollected(PickupCollected),
}

impl Event for PickupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PickupEvent::PickupOpened(_) => "fulfillment.pickup.opened",
            PickupEvent::PickupCollected(_) => "fulfillment.pickup.collected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PickupEvent::PickupOpened(e) => e.occurred_at,
            PickupEvent::PickupCollected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Pickup {
    type Command = PickupCommand;
    type Event = PickupEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PickupEvent::PickupOpened(e) => {
                self.id = e.pickup_id;
                self.supplier_id = Some(e.supplier_id);
                self.code = e.code.clone();
                self.metadata = e.metadata.clone();
                self.sub_order_ids = e.sub_order_ids.clone();
                self.status = PickupStatus::AwaitingCourier;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PickupEvent::PickupCollected(e) => {
                self.status = PickupStatus::Collected;
                self.collected_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PickupCommand::OpenPickup(cmd) => self.handle_open(cmd),
            PickupCommand::ConfirmCollected(cmd) => self.handle_collected(cmd),
        }
    }
}

impl Pickup {
    fn ensure_supplier(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.supplier_id != Some(supplier_id) {
            return Err(DomainError::invariant("supplier mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenPickup) -> Result<Vec<PickupEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("pickup already exists"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("pickup code cannot be empty"));
        }
        if cmd.sub_order_ids.is_empty() {
            return Err(DomainError::validation("pickup must contain sub-orders"));
        }
        let mut seen = Vec::with_capacity(cmd.sub_order_ids.len());
        for id in &cmd.sub_order_ids {
            if seen.contains(id) {
                return Err(DomainError::validation(format!(
                    "duplicate sub-order {id} in pickup"
                )));
            }
            seen.push(*id);
        }

        Ok(vec![PickupEvent::PickupOpened(PickupOpened {
            supplier_id: cmd.supplier_id,
            pickup_id: cmd.pickup_id,
            code: cmd.code.clone(),
            metadata: cmd.metadata.clone(),
            sub_order_ids: cmd.sub_order_ids.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_collected(&self, cmd: &ConfirmCollected) -> Result<Vec<PickupEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_supplier(cmd.supplier_id)?;
        if self.id != cmd.pickup_id {
            return Err(DomainError::invariant("pickup_id mismatch"));
        }

        // Already collected: confirming again changes nothing.
        if self.status == PickupStatus::Collected {
            return Ok(vec![]);
        }

        Ok(vec![PickupEvent::PickupCollected(PickupCollected {
            supplier_id: cmd.supplier_id,
            pickup_id: cmd.pickup_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropmart_core::AggregateId;
    use dropmart_events::execute;

    fn test_supplier_id() -> SupplierId {
        SupplierId::new()
    }

    fn test_pickup_id() -> PickupId {
        PickupId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn open_cmd(supplier_id: SupplierId, pickup_id: PickupId, ids: Vec<SubOrderId>) -> PickupCommand {
        PickupCommand::OpenPickup(OpenPickup {
            supplier_id,
            pickup_id,
            code: "PU-3F2A9C".to_string(),
            metadata: PickupMetadata {
                package_count: ids.len() as u32,
                total_weight_kg: Some("4.5".parse().unwrap()),
            },
            sub_order_ids: ids,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn open_snapshots_membership() {
        let supplier_id = test_supplier_id();
        let pickup_id = test_pickup_id();
        let ids = vec![
            SubOrderId::new(AggregateId::new()),
            SubOrderId::new(AggregateId::new()),
        ];

        let mut pickup = Pickup::empty(pickup_id);
        execute(&mut pickup, &open_cmd(supplier_id, pickup_id, ids.clone())).unwrap();

        assert_eq!(pickup.status(), PickupStatus::AwaitingCourier);
        assert_eq!(pickup.sub_order_ids(), ids.as_slice());
        assert_eq!(pickup.metadata().package_count, 2);
    }

    #[test]
    fn duplicate_sub_orders_are_rejected() {
        let supplier_id = test_supplier_id();
        let pickup_id = test_pickup_id();
        let dup = SubOrderId::new(AggregateId::new());

        let pickup = Pickup::empty(pickup_id);
        let err = pickup
            .handle(&open_cmd(supplier_id, pickup_id, vec![dup, dup]))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains(&dup.to_string())),
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn empty_pickup_is_rejected() {
        let supplier_id = test_supplier_id();
        let pickup_id = test_pickup_id();
        let pickup = Pickup::empty(pickup_id);
        let err = pickup
            .handle(&open_cmd(supplier_id, pickup_id, vec![]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn confirm_collected_is_idempotent() {
        let supplier_id = test_supplier_id();
        let pickup_id = test_pickup_id();
        let mut pickup = Pickup::empty(pickup_id);
        execute(
            &mut pickup,
            &open_cmd(
                supplier_id,
                pickup_id,
                vec![SubOrderId::new(AggregateId::new())],
            ),
        )
        .unwrap();

        let confirm = PickupCommand::ConfirmCollected(ConfirmCollected {
            supplier_id,
            pickup_id,
            occurred_at: test_time(),
        });
        let events = execute(&mut pickup, &confirm).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(pickup.status(), PickupStatus::Collected);

        let events = execute(&mut pickup, &confirm).unwrap();
        assert!(events.is_empty());
        assert_eq!(pickup.status(), PickupStatus::Collected);
    }
}
