//! Pickups domain module (event-sourced).
//!
//! A pickup is one physical courier collection event: a batch of ready
//! sub-orders snapshotted at creation, plus the printable manifest handed to
//! the courier. Pure domain logic — no IO, no storage.

pub mod manifest;
pub mod pickup;

pub use manifest::{Manifest, ManifestEntry, ManifestLine};
pub use pickup::{
    ConfirmCollected, OpenPickup, PICKUP_AGGREGATE_TYPE, Pickup, PickupCollected, PickupCommand,
    PickupEvent, PickupId, PickupMetadata, PickupOpened, PickupStatus,
};
