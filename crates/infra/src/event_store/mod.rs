//! Append-only event streams, keyed by (supplier, aggregate).

mod in_memory;
mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
