//! API-side authorization guard (the single allow/deny gate).
//!
//! Role and permission management live outside this system; the pipeline
//! only consumes a yes/no answer before any mutating call. The gate runs at
//! the route boundary so domain aggregates and infra stay auth-agnostic.

use axum::http::StatusCode;

use dropmart_core::Actor;

use crate::app::errors;

/// External authorization collaborator.
///
/// `action` is a stable dotted verb (e.g. "checkout.create",
/// "sub_orders.transition"); implementations map it onto whatever policy
/// source they have.
pub trait AuthorizationGate: Send + Sync {
    fn allow(&self, actor: &Actor, action: &str) -> bool;
}

/// Default gate: every authenticated actor may act.
///
/// Ownership rules (a supplier only touches its own entities) are still
/// enforced by the handlers on top of this.
#[derive(Debug, Default)]
pub struct AllowAll;

impl AuthorizationGate for AllowAll {
    fn allow(&self, _actor: &Actor, _action: &str) -> bool {
        true
    }
}

/// Gate that refuses everything; used to test the deny path.
#[derive(Debug, Default)]
pub struct DenyAll;

impl AuthorizationGate for DenyAll {
    fn allow(&self, _actor: &Actor, _action: &str) -> bool {
        false
    }
}

/// Check authorization for an action in the current request context.
///
/// Intended to be called **before** invoking a service.
pub fn authorize(
    gate: &dyn AuthorizationGate,
    actor: &Actor,
    action: &str,
) -> Result<(), axum::response::Response> {
    if gate.allow(actor, action) {
        Ok(())
    } else {
        Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("{actor} may not perform {action}"),
        ))
    }
}
