//! Command execution pipeline (application-level orchestration).
//!
//! The one consistent execution model for every aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (supplier-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to the bus (projections, workers)
//! ```
//!
//! Events are persisted before publication: if the append fails nothing is
//! published, and if publication fails the events are already durable, so
//! retrying gives at-least-once delivery to consumers.
//!
//! The dispatcher composes the `EventStore` and `EventBus` traits; it
//! contains no IO of its own and works unchanged against the in-memory pair
//! or a persistent backend.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use dropmart_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, SupplierId};
use dropmart_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Supplier isolation violation (cross-supplier or cross-aggregate stream mixing).
    SupplierIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Stock reservation exceeded the available counter.
    InsufficientStock(String),
    /// Requested status not reachable from the current status.
    InvalidTransition(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::SupplierIsolation(msg) => {
                DispatchError::SupplierIsolation(msg.clone())
            }
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InsufficientStock(msg) => DispatchError::InsufficientStock(msg),
            DomainError::InvalidTransition(msg) => DispatchError::InvalidTransition(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Guarantees per dispatch:
/// - **Atomicity**: events append before publication; a failed append
///   publishes nothing
/// - **Isolation**: one command targets one aggregate stream
/// - **Concurrency**: the append carries an exact expected version, so two
///   racing dispatches on one stream resolve to exactly one winner; the
///   loser gets `DispatchError::Concurrency` and must re-read and retry
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline, accepting whatever
    /// version the stream is currently at.
    pub fn dispatch<A>(
        &self,
        supplier_id: SupplierId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(SupplierId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: dropmart_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_expecting::<A>(
            supplier_id,
            aggregate_id,
            aggregate_type,
            command,
            ExpectedVersion::Any,
            make_aggregate,
        )
    }

    /// Dispatch a command, additionally requiring the stream to be at the
    /// caller's expected version.
    ///
    /// This is how an external caller's `expected_version` travels end-to-end
    /// into the append: a stale expectation fails with
    /// `DispatchError::Concurrency` before the command is even handled, and a
    /// race between our load and our append is caught by the store's own
    /// version check.
    pub fn dispatch_expecting<A>(
        &self,
        supplier_id: SupplierId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        expected: ExpectedVersion,
        make_aggregate: impl FnOnce(SupplierId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: dropmart_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (supplier-scoped) and rehydrate.
        let history = self.store.load_stream(supplier_id, aggregate_id)?;
        validate_loaded_stream(supplier_id, aggregate_id, &history)?;
        let current = stream_version(&history);

        if !expected.matches(current) {
            return Err(DispatchError::Concurrency(format!(
                "stale version: expected {expected:?}, stream is at {current}"
            )));
        }

        let mut aggregate = make_aggregate(supplier_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 2) Decide events (no mutation).
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 3) Persist (append-only, optimistic).
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    supplier_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(current))?;

        // 4) Publish committed events (after append).
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

/// Rebuild an aggregate from its stream without dispatching anything.
///
/// Returns the aggregate plus the stream version it was rebuilt at, which is
/// the version an external caller should echo back as `expected_version`.
pub fn rehydrate<S, A>(
    store: &S,
    supplier_id: SupplierId,
    aggregate_id: AggregateId,
    make_aggregate: impl FnOnce(SupplierId, AggregateId) -> A,
) -> Result<(A, u64), DispatchError>
where
    S: EventStore,
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(supplier_id, aggregate_id)?;
    validate_loaded_stream(supplier_id, aggregate_id, &history)?;
    let version = stream_version(&history);

    let mut aggregate = make_aggregate(supplier_id, aggregate_id);
    apply_history::<A>(&mut aggregate, &history)?;
    Ok((aggregate, version))
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    supplier_id: SupplierId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce supplier isolation even if a buggy backend returns
    // cross-supplier data, and require monotonic sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.supplier_id != supplier_id {
            return Err(DispatchError::SupplierIsolation(format!(
                "loaded stream contains wrong supplier_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::SupplierIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
