use std::sync::Arc;

use axum::{Extension, Router};

use dropmart_infra::clock::{Clock, SystemClock};
use dropmart_infra::services::ServiceSet;

use crate::authz::{AllowAll, AuthorizationGate};
use crate::context;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared application state: the pipeline services plus the authz gate.
pub struct ApiState {
    pub services: ServiceSet,
    pub gate: Arc<dyn AuthorizationGate>,
}

/// Build the production app (in-memory backend, permissive gate).
pub fn build_app() -> Router {
    build_app_with_gate(Arc::new(AllowAll))
}

/// Build the app with a custom authorization gate.
pub fn build_app_with_gate(gate: Arc<dyn AuthorizationGate>) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    build_app_with(ServiceSet::in_memory(clock), gate)
}

/// Build the app over pre-wired services (tests inject their own clock).
pub fn build_app_with(services: ServiceSet, gate: Arc<dyn AuthorizationGate>) -> Router {
    let state = Arc::new(ApiState { services, gate });

    Router::new()
        .merge(routes::system::router())
        .merge(routes::catalog::router())
        .merge(routes::checkout::router())
        .merge(routes::sub_orders::router())
        .merge(routes::pickups::router())
        .merge(routes::financials::router())
        .layer(axum::middleware::from_fn(context::actor_context))
        .layer(Extension(state))
}
