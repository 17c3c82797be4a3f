use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use dropmart_core::Actor;
use dropmart_orders::{OrderId, SubOrderId, SubOrderStatus};

use crate::app::routes::common;
use crate::app::{ApiState, dto, errors};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/sub-orders/:id", get(get_sub_order))
        .route("/sub-orders/:id/transition", post(transition))
        .route("/suppliers/:id/sub-orders", get(list_sub_orders))
        .route("/orders/:id", get(get_order))
}

async fn transition(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionRequest>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "sub_orders.transition") {
        return r;
    }

    let aggregate_id = match common::parse_aggregate_id(&id, "sub-order") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let sub_order_id = SubOrderId::new(aggregate_id);

    let new_status: SubOrderStatus = match body.new_status.parse() {
        Ok(s) => s,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_status",
                format!("unknown status '{}'", body.new_status),
            );
        }
    };

    // Sub-orders are owned exclusively by their supplier for transitions;
    // platform specialists may also intervene (cancellations, returns).
    let owner = state
        .services
        .projections
        .sub_orders
        .supplier_of(sub_order_id);
    match (owner, actor) {
        (None, _) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown sub-order");
        }
        (Some(owner), Actor::Supplier(supplier_id)) if supplier_id != owner => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "sub-order belongs to another supplier",
            );
        }
        (Some(_), Actor::Reseller(_)) => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "resellers may not transition sub-orders",
            );
        }
        _ => {}
    }

    match state.services.fulfillment.transition(
        sub_order_id,
        new_status,
        actor,
        body.description,
        body.idempotency_key,
        body.expected_version,
    ) {
        Ok(model) => (StatusCode::OK, Json(model)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn get_sub_order(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let aggregate_id = match common::parse_aggregate_id(&id, "sub-order") {
        Ok(v) => v,
        Err(r) => return r,
    };

    match state
        .services
        .fulfillment
        .get_sub_order(SubOrderId::new(aggregate_id))
    {
        Some(model) => (StatusCode::OK, Json(model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown sub-order"),
    }
}

async fn list_sub_orders(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };

    let supplier_id = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid supplier id");
        }
    };

    // A supplier sees its own worklist; specialists see any.
    match actor {
        Actor::Supplier(s) if s != supplier_id => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "worklist belongs to another supplier",
            );
        }
        Actor::Reseller(_) => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "resellers may not list supplier worklists",
            );
        }
        _ => {}
    }

    let models = state.services.fulfillment.list_sub_orders(supplier_id);
    (StatusCode::OK, Json(models)).into_response()
}

async fn get_order(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let aggregate_id = match common::parse_aggregate_id(&id, "order") {
        Ok(v) => v,
        Err(r) => return r,
    };

    match state
        .services
        .fulfillment
        .get_order(OrderId::new(aggregate_id))
    {
        Some(order) => (StatusCode::OK, Json(order)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown order"),
    }
}
