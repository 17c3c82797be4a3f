use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use dropmart_core::{AggregateId, ExpectedVersion, SupplierId};

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Lifecycle of an event:
///
/// 1. **Domain event**: produced by an aggregate's `handle()`
/// 2. **UncommittedEvent**: wrapped with stream metadata
/// 3. **StoredEvent**: persisted with an assigned sequence_number
/// 4. **EventEnvelope**: published to the event bus for consumers
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed domain
/// event: it serializes the payload to JSON and captures the event metadata
/// needed for later deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub supplier_id: SupplierId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(
        supplier_id: SupplierId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: dropmart_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            supplier_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: dropmart_events::Event::version(event),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are assigned by the store during append; they are
/// monotonically increasing, scoped to one (supplier, aggregate) stream, and
/// immutable once assigned. They drive ordering, optimistic concurrency and
/// projection idempotency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub supplier_id: SupplierId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a supplier-scoped event envelope for publication.
    pub fn to_envelope(&self) -> dropmart_events::EventEnvelope<JsonValue> {
        dropmart_events::EventEnvelope::new(
            self.event_id,
            self.supplier_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Optimistic concurrency check failed (version mismatch).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-supplier access attempted.
    #[error("supplier isolation violation: {0}")]
    SupplierIsolation(String),

    /// Appended events don't match the stream's aggregate type.
    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    /// Malformed append (empty metadata, serialization failure, ...).
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only event store contract.
///
/// One stream per (supplier, aggregate). `append` is the single serialization
/// point for writers: the `expected_version` check makes two concurrent
/// appends to the same stream resolve to exactly one winner.
pub trait EventStore: Send + Sync {
    /// Append events to a single stream, enforcing the expected version.
    ///
    /// All events in the batch must target the same (supplier, aggregate)
    /// stream; the batch commits atomically or not at all.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for one aggregate, in sequence order.
    fn load_stream(
        &self,
        supplier_id: SupplierId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        supplier_id: SupplierId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(supplier_id, aggregate_id)
    }
}
