//! Application services: the four external operations plus catalog
//! management, wired over the dispatcher and the projection set.
//!
//! Each service method is one unit of work. Committed envelopes are applied
//! to the projections synchronously (read-your-writes for the service layer);
//! the bus still broadcasts every envelope for external consumers, and the
//! cursor-idempotent projections tolerate seeing an envelope twice.

pub mod catalog;
pub mod checkout;
pub mod financials;
pub mod fulfillment;
pub mod pickup;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use dropmart_events::{EventEnvelope, InMemoryEventBus};
use dropmart_finance::ReportConfig;

use crate::clock::Clock;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::InMemoryEventStore;
use crate::projections::ProjectionSet;

pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use financials::FinancialsService;
pub use fulfillment::FulfillmentService;
pub use pickup::PickupService;

pub type SharedStore = Arc<InMemoryEventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type SharedDispatcher = CommandDispatcher<SharedStore, SharedBus>;

/// Bounded retry budget for optimistic-concurrency conflicts: fail fast and
/// surface `Conflict` to the caller rather than block.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Retry `op` on concurrency conflicts only, up to `attempts` tries.
pub(crate) fn with_conflict_retry<T>(
    attempts: u32,
    mut op: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut last = None;
    for _ in 0..attempts {
        match op() {
            Err(DispatchError::Concurrency(msg)) => {
                last = Some(msg);
                continue;
            }
            other => return other,
        }
    }
    Err(DispatchError::Concurrency(
        last.unwrap_or_else(|| "conflict retries exhausted".to_string()),
    ))
}

/// The whole pipeline, wired over one store/bus/projection set.
pub struct ServiceSet {
    pub store: SharedStore,
    pub bus: SharedBus,
    pub dispatcher: Arc<SharedDispatcher>,
    pub projections: Arc<ProjectionSet>,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub fulfillment: FulfillmentService,
    pub pickups: PickupService,
    pub financials: FinancialsService,
}

impl ServiceSet {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::in_memory_with_config(clock, ReportConfig::default())
    }

    pub fn in_memory_with_config(clock: Arc<dyn Clock>, config: ReportConfig) -> Self {
        let store: SharedStore = Arc::new(InMemoryEventStore::new());
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
        let projections = Arc::new(ProjectionSet::in_memory());

        Self {
            catalog: CatalogService::new(
                dispatcher.clone(),
                projections.clone(),
                clock.clone(),
            ),
            checkout: CheckoutService::new(
                dispatcher.clone(),
                store.clone(),
                projections.clone(),
                clock.clone(),
            ),
            fulfillment: FulfillmentService::new(
                dispatcher.clone(),
                store.clone(),
                projections.clone(),
                clock.clone(),
            ),
            pickups: PickupService::new(
                dispatcher.clone(),
                store.clone(),
                projections.clone(),
                clock.clone(),
            ),
            financials: FinancialsService::new(projections.clone(), clock, config),
            store,
            bus,
            dispatcher,
            projections,
        }
    }
}
