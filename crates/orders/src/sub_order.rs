use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dropmart_catalog::{ProductId, VariationId};
use dropmart_core::{
    Actor, Aggregate, AggregateId, AggregateRoot, DomainError, ResellerId, SupplierId,
};
use dropmart_events::Event;

use crate::cart::{ClientInfo, OrderId};

/// Stream type identifier for sub-order aggregates.
pub const SUB_ORDER_AGGREGATE_TYPE: &str = "fulfillment.sub_order";

/// Sub-order identifier (supplier-scoped via `supplier_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubOrderId(pub AggregateId);

impl SubOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SubOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sub-order delivery lifecycle.
///
/// The wire names are the platform's French business vocabulary (accent-less
/// for transport safety); variants are a closed set so an unknown status is a
/// parse error, never a typo that silently matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubOrderStatus {
    #[serde(rename = "non_confirmee")]
    Unconfirmed,
    #[serde(rename = "en_cours")]
    InProgress,
    #[serde(rename = "pret_pour_enlevement")]
    ReadyForPickup,
    #[serde(rename = "livre")]
    Delivered,
    #[serde(rename = "livre_paye")]
    DeliveredPaid,
    #[serde(rename = "livre_non_paye")]
    DeliveredUnpaid,
    #[serde(rename = "retourne")]
    Returned,
    #[serde(rename = "annule")]
    Cancelled,
}

impl SubOrderStatus {
    pub const ALL: [SubOrderStatus; 8] = [
        SubOrderStatus::Unconfirmed,
        SubOrderStatus::InProgress,
        SubOrderStatus::ReadyForPickup,
        SubOrderStatus::Delivered,
        SubOrderStatus::DeliveredPaid,
        SubOrderStatus::DeliveredUnpaid,
        SubOrderStatus::Returned,
        SubOrderStatus::Cancelled,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            SubOrderStatus::Unconfirmed => "non_confirmee",
            SubOrderStatus::InProgress => "en_cours",
            SubOrderStatus::ReadyForPickup => "pret_pour_enlevement",
            SubOrderStatus::Delivered => "livre",
            SubOrderStatus::DeliveredPaid => "livre_paye",
            SubOrderStatus::DeliveredUnpaid => "livre_non_paye",
            SubOrderStatus::Returned => "retourne",
            SubOrderStatus::Cancelled => "annule",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubOrderStatus::DeliveredPaid
                | SubOrderStatus::DeliveredUnpaid
                | SubOrderStatus::Returned
                | SubOrderStatus::Cancelled
        )
    }

    /// Delivered family: `livre` plus both paid-status variants.
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            SubOrderStatus::Delivered
                | SubOrderStatus::DeliveredPaid
                | SubOrderStatus::DeliveredUnpaid
        )
    }
}

impl core::fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl core::str::FromStr for SubOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "non_confirmee" => Ok(SubOrderStatus::Unconfirmed),
            "en_cours" => Ok(SubOrderStatus::InProgress),
            "pret_pour_enlevement" => Ok(SubOrderStatus::ReadyForPickup),
            "livre" => Ok(SubOrderStatus::Delivered),
            "livre_paye" => Ok(SubOrderStatus::DeliveredPaid),
            "livre_non_paye" => Ok(SubOrderStatus::DeliveredUnpaid),
            "retourne" => Ok(SubOrderStatus::Returned),
            "annule" => Ok(SubOrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown sub-order status '{other}'"
            ))),
        }
    }
}

/// What an allowed transition does besides changing status.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    /// The transition records a failed delivery attempt (counter bump)
    /// rather than a true status change.
    pub counts_failed_attempt: bool,
    /// Entering this status returns every reserved line quantity to stock.
    pub releases_stock: bool,
}

const PLAIN: TransitionRule = TransitionRule {
    counts_failed_attempt: false,
    releases_stock: false,
};
const RELEASING: TransitionRule = TransitionRule {
    counts_failed_attempt: false,
    releases_stock: true,
};
const FAILED_ATTEMPT: TransitionRule = TransitionRule {
    counts_failed_attempt: true,
    releases_stock: false,
};

/// The explicit transition table, keyed by (current, requested).
///
/// `None` means the transition does not exist and must surface as
/// `InvalidTransition`. Terminal statuses have no outgoing edges.
pub fn transition_rule(from: SubOrderStatus, to: SubOrderStatus) -> Option<TransitionRule> {
    use SubOrderStatus::*;

    match (from, to) {
        (Unconfirmed, InProgress) => Some(PLAIN),
        (Unconfirmed, Cancelled) => Some(RELEASING),

        // Same-status retry: a failed delivery attempt, not a status change.
        (InProgress, InProgress) => Some(FAILED_ATTEMPT),
        (InProgress, ReadyForPickup) => Some(PLAIN),
        (InProgress, Returned) => Some(RELEASING),
        (InProgress, Cancelled) => Some(RELEASING),

        (ReadyForPickup, Delivered) => Some(PLAIN),
        (ReadyForPickup, Returned) => Some(RELEASING),
        (ReadyForPickup, Cancelled) => Some(RELEASING),

        (Delivered, DeliveredPaid) => Some(PLAIN),
        (Delivered, DeliveredUnpaid) => Some(PLAIN),

        _ => None,
    }
}

/// One fulfillment line of a sub-order (a subset of the parent cart's lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderLine {
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub unit_sale_price: Decimal,
    pub unit_wholesale_price: Decimal,
}

impl SubOrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_sale_price * Decimal::from(self.quantity)
    }

    pub fn line_profit(&self) -> Decimal {
        (self.unit_sale_price - self.unit_wholesale_price) * Decimal::from(self.quantity)
    }
}

/// One immutable audit record of the sub-order's history.
///
/// Materialized from the event stream; the stream itself remains the source
/// of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: SubOrderStatus,
    pub actor: Actor,
    pub description: Option<String>,
    /// Failed delivery attempts accumulated up to and including this record.
    pub delivery_attempts: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: SubOrder.
///
/// Owned exclusively by its supplier for status transitions; read by the
/// reseller and by the financial aggregator through read models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubOrder {
    id: SubOrderId,
    order_id: Option<OrderId>,
    supplier_id: Option<SupplierId>,
    reseller_id: Option<ResellerId>,
    client: Option<ClientInfo>,
    lines: Vec<SubOrderLine>,
    delivery_fee: Decimal,
    platform_fee: Decimal,
    status: SubOrderStatus,
    delivery_attempts: u32,
    tracking: Vec<TrackingEntry>,
    applied_keys: HashSet<Uuid>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SubOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SubOrderId) -> Self {
        Self {
            id,
            order_id: None,
            supplier_id: None,
            reseller_id: None,
            client: None,
            lines: Vec::new(),
            delivery_fee: Decimal::ZERO,
            platform_fee: Decimal::ZERO,
            status: SubOrderStatus::Unconfirmed,
            delivery_attempts: 0,
            tracking: Vec::new(),
            applied_keys: HashSet::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SubOrderId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn reseller_id(&self) -> Option<ResellerId> {
        self.reseller_id
    }

    pub fn client(&self) -> Option<&ClientInfo> {
        self.client.as_ref()
    }

    pub fn lines(&self) -> &[SubOrderLine] {
        &self.lines
    }

    pub fn delivery_fee(&self) -> Decimal {
        self.delivery_fee
    }

    pub fn platform_fee(&self) -> Decimal {
        self.platform_fee
    }

    pub fn status(&self) -> SubOrderStatus {
        self.status
    }

    pub fn delivery_attempts(&self) -> u32 {
        self.delivery_attempts
    }

    /// Full ordered audit trail.
    pub fn tracking(&self) -> &[TrackingEntry] {
        &self.tracking
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn has_applied(&self, idempotency_key: Uuid) -> bool {
        self.applied_keys.contains(&idempotency_key)
    }

    /// `Σ(unit_sale_price × quantity) + delivery_fee`
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.line_total()).sum::<Decimal>() + self.delivery_fee
    }

    /// Supplier-facing margin across lines (excludes fees).
    pub fn profit(&self) -> Decimal {
        self.lines.iter().map(|l| l.line_profit()).sum()
    }
}

impl AggregateRoot for SubOrder {
    type Id = SubOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenSubOrder (emitted by the checkout splitter, one per supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSubOrder {
    pub supplier_id: SupplierId,
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub reseller_id: ResellerId,
    pub client: ClientInfo,
    pub lines: Vec<SubOrderLine>,
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordTransition (drives the delivery lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransition {
    pub supplier_id: SupplierId,
    pub sub_order_id: SubOrderId,
    pub new_status: SubOrderStatus,
    pub actor: Actor,
    pub description: Option<String>,
    /// Replaying the same key is a no-op returning the already-applied state.
    pub idempotency_key: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubOrderCommand {
    OpenSubOrder(OpenSubOrder),
    RecordTransition(RecordTransition),
}

impl dropmart_events::Command for SubOrderCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            SubOrderCommand::OpenSubOrder(c) => c.sub_order_id.0,
            SubOrderCommand::RecordTransition(c) => c.sub_order_id.0,
        }
    }
}

/// Event: SubOrderOpened.
///
/// Carries the full order snapshot so the cart-level order is durably
/// persisted by the set of opened events sharing `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderOpened {
    pub supplier_id: SupplierId,
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub reseller_id: ResellerId,
    pub client: ClientInfo,
    pub lines: Vec<SubOrderLine>,
    pub delivery_fee: Decimal,
    pub platform_fee: Decimal,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusRecorded (one per applied transition — the tracking record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecorded {
    pub supplier_id: SupplierId,
    pub sub_order_id: SubOrderId,
    pub previous_status: SubOrderStatus,
    pub new_status: SubOrderStatus,
    pub actor: Actor,
    pub description: Option<String>,
    pub failed_attempt: bool,
    pub idempotency_key: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubOrderEvent {
    SubOrderOpened(SubOrderOpened),
    StatusRecorded(StatusRecorded),
}

impl Event for SubOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubOrderEvent::SubOrderOpened(_) => "fulfillment.sub_order.opened",
            SubOrderEvent::StatusRecorded(_) => "fulfillment.sub_order.status_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SubOrderEvent::SubOrderOpened(e) => e.occurred_at,
            SubOrderEvent::StatusRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SubOrder {
    type Command = SubOrderCommand;
    type Event = SubOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SubOrderEvent::SubOrderOpened(e) => {
                self.id = e.sub_order_id;
                self.order_id = Some(e.order_id);
                self.supplier_id = Some(e.supplier_id);
                self.reseller_id = Some(e.reseller_id);
                self.client = Some(e.client.clone());
                self.lines = e.lines.clone();
                self.delivery_fee = e.delivery_fee;
                self.platform_fee = e.platform_fee;
                self.status = SubOrderStatus::Unconfirmed;
                self.delivery_attempts = 0;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.tracking.push(TrackingEntry {
                    status: SubOrderStatus::Unconfirmed,
                    actor: e.actor,
                    description: None,
                    delivery_attempts: 0,
                    occurred_at: e.occurred_at,
                });
                self.created = true;
            }
            SubOrderEvent::StatusRecorded(e) => {
                self.status = e.new_status;
                if e.failed_attempt {
                    self.delivery_attempts += 1;
                }
                self.applied_keys.insert(e.idempotency_key);
                self.updated_at = Some(e.occurred_at);
                self.tracking.push(TrackingEntry {
                    status: e.new_status,
                    actor: e.actor,
                    description: e.description.clone(),
                    delivery_attempts: self.delivery_attempts,
                    occurred_at: e.occurred_at,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SubOrderCommand::OpenSubOrder(cmd) => self.handle_open(cmd),
            SubOrderCommand::RecordTransition(cmd) => self.handle_transition(cmd),
        }
    }
}

impl SubOrder {
    fn ensure_supplier(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.supplier_id != Some(supplier_id) {
            return Err(DomainError::invariant("supplier mismatch"));
        }
        Ok(())
    }

    fn ensure_sub_order_id(&self, sub_order_id: SubOrderId) -> Result<(), DomainError> {
        if self.id != sub_order_id {
            return Err(DomainError::invariant("sub_order_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenSubOrder) -> Result<Vec<SubOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sub-order already exists"));
        }
        cmd.client.validate()?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("sub-order must have lines"));
        }
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("line quantity must be positive"));
            }
            if line.unit_sale_price < Decimal::ZERO || line.unit_wholesale_price < Decimal::ZERO {
                return Err(DomainError::validation("line prices cannot be negative"));
            }
        }
        if cmd.delivery_fee < Decimal::ZERO {
            return Err(DomainError::validation("delivery_fee cannot be negative"));
        }
        if cmd.platform_fee < Decimal::ZERO {
            return Err(DomainError::validation("platform_fee cannot be negative"));
        }

        Ok(vec![SubOrderEvent::SubOrderOpened(SubOrderOpened {
            supplier_id: cmd.supplier_id,
            sub_order_id: cmd.sub_order_id,
            order_id: cmd.order_id,
            reseller_id: cmd.reseller_id,
            client: cmd.client.clone(),
            lines: cmd.lines.clone(),
            delivery_fee: cmd.delivery_fee,
            platform_fee: cmd.platform_fee,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &RecordTransition) -> Result<Vec<SubOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_supplier(cmd.supplier_id)?;
        self.ensure_sub_order_id(cmd.sub_order_id)?;

        // Replay of an already-applied request: no-op, no duplicate tracking.
        if self.has_applied(cmd.idempotency_key) {
            return Ok(vec![]);
        }

        let rule = transition_rule(self.status, cmd.new_status).ok_or_else(|| {
            DomainError::invalid_transition(format!(
                "sub-order {}: cannot move from {} to {}",
                self.id, self.status, cmd.new_status
            ))
        })?;

        Ok(vec![SubOrderEvent::StatusRecorded(StatusRecorded {
            supplier_id: cmd.supplier_id,
            sub_order_id: cmd.sub_order_id,
            previous_status: self.status,
            new_status: cmd.new_status,
            actor: cmd.actor,
            description: cmd.description.clone(),
            failed_attempt: rule.counts_failed_attempt,
            idempotency_key: cmd.idempotency_key,
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

    fn test_sub_order_id() -> SubOrderId {
        SubOrderId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn price(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_client() -> ClientInfo {
        ClientInfo {
            name: "Amine B.".to_string(),
            phone: "0550 12 34 56".to_string(),
            address: "12 rue Didouche Mourad, Alger".to_string(),
        }
    }

    fn opened_sub_order(supplier_id: SupplierId, sub_order_id: SubOrderId) -> SubOrder {
        let mut sub_order = SubOrder::empty(sub_order_id);
        let cmd = SubOrderCommand::OpenSubOrder(OpenSubOrder {
            supplier_id,
            sub_order_id,
            order_id: OrderId::new(AggregateId::new()),
            reseller_id: ResellerId::new(),
            client: test_client(),
            lines: vec![SubOrderLine {
                product_id: ProductId::new(AggregateId::new()),
                variation_id: None,
                quantity: 2,
                unit_sale_price: price("55.00"),
                unit_wholesale_price: price("40.00"),
            }],
            delivery_fee: price("10.00"),
            platform_fee: price("5.00"),
            actor: Actor::Reseller(ResellerId::new()),
            occurred_at: test_time(),
        });
        execute(&mut sub_order, &cmd).unwrap();
        sub_order
    }

    fn transition(
        sub_order: &mut SubOrder,
        supplier_id: SupplierId,
        new_status: SubOrderStatus,
    ) -> Result<Vec<SubOrderEvent>, DomainError> {
        let cmd = SubOrderCommand::RecordTransition(RecordTransition {
            supplier_id,
            sub_order_id: sub_order.id_typed(),
            new_status,
            actor: Actor::Supplier(supplier_id),
            description: None,
            idempotency_key: Uuid::now_v7(),
            occurred_at: test_time(),
        });
        execute(sub_order, &cmd)
    }

    #[test]
    fn open_sets_initial_status_and_tracking() {
        let supplier_id = test_supplier_id();
        let sub_order = opened_sub_order(supplier_id, test_sub_order_id());

        assert_eq!(sub_order.status(), SubOrderStatus::Unconfirmed);
        assert_eq!(sub_order.tracking().len(), 1);
        assert_eq!(sub_order.tracking()[0].status, SubOrderStatus::Unconfirmed);
        assert_eq!(sub_order.total(), price("120.00"));
        assert_eq!(sub_order.profit(), price("30.00"));
    }

    #[test]
    fn full_lifecycle_to_delivered_paid() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());

        transition(&mut sub_order, supplier_id, SubOrderStatus::InProgress).unwrap();
        transition(&mut sub_order, supplier_id, SubOrderStatus::ReadyForPickup).unwrap();
        transition(&mut sub_order, supplier_id, SubOrderStatus::Delivered).unwrap();
        transition(&mut sub_order, supplier_id, SubOrderStatus::DeliveredPaid).unwrap();

        assert_eq!(sub_order.status(), SubOrderStatus::DeliveredPaid);
        assert!(sub_order.status().is_terminal());
        // One opening record + four transitions.
        assert_eq!(sub_order.tracking().len(), 5);
    }

    #[test]
    fn transition_table_closure() {
        use SubOrderStatus::*;

        let allowed: &[(SubOrderStatus, SubOrderStatus)] = &[
            (Unconfirmed, InProgress),
            (Unconfirmed, Cancelled),
            (InProgress, InProgress),
            (InProgress, ReadyForPickup),
            (InProgress, Returned),
            (InProgress, Cancelled),
            (ReadyForPickup, Delivered),
            (ReadyForPickup, Returned),
            (ReadyForPickup, Cancelled),
            (Delivered, DeliveredPaid),
            (Delivered, DeliveredUnpaid),
        ];

        for from in SubOrderStatus::ALL {
            for to in SubOrderStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    transition_rule(from, to).is_some(),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }

        // Terminal statuses have no outgoing edges at all.
        for from in SubOrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in SubOrderStatus::ALL {
                assert!(transition_rule(from, to).is_none());
            }
        }
    }

    #[test]
    fn invalid_transition_names_both_statuses() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());

        let err = transition(&mut sub_order, supplier_id, SubOrderStatus::Delivered).unwrap_err();
        match err {
            DomainError::InvalidTransition(msg) => {
                assert!(msg.contains("non_confirmee"));
                assert!(msg.contains("livre"));
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
        // Status and tracking untouched.
        assert_eq!(sub_order.status(), SubOrderStatus::Unconfirmed);
        assert_eq!(sub_order.tracking().len(), 1);
    }

    #[test]
    fn terminal_status_rejects_everything() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());
        transition(&mut sub_order, supplier_id, SubOrderStatus::Cancelled).unwrap();

        for to in SubOrderStatus::ALL {
            let err = transition(&mut sub_order, supplier_id, to).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition(_)));
        }
    }

    #[test]
    fn replayed_idempotency_key_is_a_no_op() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());

        let key = Uuid::now_v7();
        let cmd = SubOrderCommand::RecordTransition(RecordTransition {
            supplier_id,
            sub_order_id: sub_order.id_typed(),
            new_status: SubOrderStatus::InProgress,
            actor: Actor::Supplier(supplier_id),
            description: Some("confirmed by phone".to_string()),
            idempotency_key: key,
            occurred_at: test_time(),
        });

        let events = execute(&mut sub_order, &cmd).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(sub_order.tracking().len(), 2);

        // Same key again: zero events, no duplicate tracking record.
        let events = execute(&mut sub_order, &cmd).unwrap();
        assert!(events.is_empty());
        assert_eq!(sub_order.tracking().len(), 2);
        assert_eq!(sub_order.status(), SubOrderStatus::InProgress);
    }

    #[test]
    fn failed_delivery_attempt_bumps_counter_without_status_change() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());
        transition(&mut sub_order, supplier_id, SubOrderStatus::InProgress).unwrap();
        assert_eq!(sub_order.delivery_attempts(), 0);

        transition(&mut sub_order, supplier_id, SubOrderStatus::InProgress).unwrap();
        transition(&mut sub_order, supplier_id, SubOrderStatus::InProgress).unwrap();

        assert_eq!(sub_order.status(), SubOrderStatus::InProgress);
        assert_eq!(sub_order.delivery_attempts(), 2);
        let last = sub_order.tracking().last().unwrap();
        assert_eq!(last.delivery_attempts, 2);
    }

    #[test]
    fn version_increments_on_apply() {
        let supplier_id = test_supplier_id();
        let mut sub_order = opened_sub_order(supplier_id, test_sub_order_id());
        assert_eq!(sub_order.version(), 1);

        transition(&mut sub_order, supplier_id, SubOrderStatus::InProgress).unwrap();
        assert_eq!(sub_order.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let supplier_id = test_supplier_id();
        let sub_order = opened_sub_order(supplier_id, test_sub_order_id());
        let before_status = sub_order.status();
        let before_version = sub_order.version();

        let cmd = SubOrderCommand::RecordTransition(RecordTransition {
            supplier_id,
            sub_order_id: sub_order.id_typed(),
            new_status: SubOrderStatus::InProgress,
            actor: Actor::Supplier(supplier_id),
            description: None,
            idempotency_key: Uuid::now_v7(),
            occurred_at: test_time(),
        });
        let events1 = sub_order.handle(&cmd).unwrap();
        let events2 = sub_order.handle(&cmd).unwrap();

        assert_eq!(sub_order.status(), before_status);
        assert_eq!(sub_order.version(), before_version);
        assert_eq!(events1, events2);
    }
}
