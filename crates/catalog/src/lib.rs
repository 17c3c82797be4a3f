//! Catalog domain module (event-sourced).
//!
//! This crate owns the authoritative stock ledger: per-variation counters,
//! the product-level aggregate counter, and the open-reservation table that
//! bounds what a release may return. Pure domain logic — no IO, no storage.

pub mod product;

pub use product::{
    DefineProduct, PRODUCT_AGGREGATE_TYPE, Product, ProductCommand, ProductDefined, ProductEvent,
    ProductId, ReleaseStock, ReplenishStock, ReservationKey, ReserveStock, StockReleased,
    StockReplenished, StockReserved, Variation, VariationId, VariationSpec,
};
