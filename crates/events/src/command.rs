use dropmart_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent** — a request to perform an action on an
/// aggregate. They are transient (not persisted) and are transformed into
/// events (which are persisted). A command is rejected if invalid; events
/// represent accepted changes.
///
/// Commands must name their target aggregate so infrastructure can route them
/// and scope each command to one aggregate (the transaction boundary).
/// Supplier isolation is enforced at the event level (envelopes), not here.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
