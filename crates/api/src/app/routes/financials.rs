use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use dropmart_core::Actor;

use crate::app::routes::common;
use crate::app::{ApiState, dto, errors};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new().route("/suppliers/:id/financials", get(financials))
}

async fn financials(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
    Query(query): Query<dto::FinancialsQuery>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "financials.read") {
        return r;
    }

    let supplier_id = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id");
        }
    };

    // Dashboard figures are supplier-private; specialists see any supplier.
    match actor {
        Actor::Supplier(s) if s != supplier_id => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "financials belong to another supplier",
            );
        }
        Actor::Reseller(_) => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "resellers may not read supplier financials",
            );
        }
        _ => {}
    }

    match state
        .services
        .financials
        .get_financials(supplier_id, query.start, query.end)
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
