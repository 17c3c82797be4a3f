//! Actor identity attached to audit records.

use serde::{Deserialize, Serialize};

use crate::id::{ResellerId, SpecialistId, SupplierId};

/// Who performed an action on a fulfillment entity.
///
/// Every tracking record carries the acting party. Authentication itself is
/// out of scope here; actors arrive pre-verified from the boundary layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Supplier(SupplierId),
    Reseller(ResellerId),
    Specialist(SpecialistId),
}

impl Actor {
    pub fn role(&self) -> &'static str {
        match self {
            Actor::Supplier(_) => "supplier",
            Actor::Reseller(_) => "reseller",
            Actor::Specialist(_) => "specialist",
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::Supplier(id) => write!(f, "supplier:{id}"),
            Actor::Reseller(id) => write!(f, "reseller:{id}"),
            Actor::Specialist(id) => write!(f, "specialist:{id}"),
        }
    }
}
