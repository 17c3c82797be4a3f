//! Event mechanics: traits, envelopes, bus, projections.
//!
//! This crate is domain-agnostic machinery. Domain events themselves live in
//! the domain crates (`dropmart-catalog`, `dropmart-orders`, `dropmart-pickups`).

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod supplier;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{CommandHandler, execute};
pub use in_memory_bus::InMemoryEventBus;
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
pub use supplier::SupplierScoped;
