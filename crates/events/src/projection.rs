use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections implement the CQRS read-model pattern: events (write model)
/// are transformed into queryable state (read model). Read models are
/// **disposable** — they can be deleted and rebuilt from events at any time,
/// because events remain the source of truth.
///
/// Projections must be **idempotent**: applying the same event multiple times
/// must produce the same result. This makes at-least-once delivery, replay,
/// and crash recovery safe. The `ProjectionRunner` helps by tracking sequence
/// numbers and rejecting non-monotonic input, but projections should still be
/// written defensively at the domain level.
///
/// Persistence of the read model is an infrastructure concern and lives
/// outside this crate.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// The envelope includes `supplier_id`, which must be used to scope read
    /// model updates so one supplier's data never leaks into another's view.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
