//! Disposable read-model storage.

mod supplier_store;

pub use supplier_store::{InMemorySupplierStore, SupplierStore};
