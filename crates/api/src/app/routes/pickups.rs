use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use dropmart_core::Actor;
use dropmart_orders::SubOrderId;
use dropmart_pickups::{PickupId, PickupMetadata};

use crate::app::routes::common;
use crate::app::{ApiState, dto, errors};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/pickups", post(create_pickup))
        .route("/pickups/:id/collected", post(confirm_collected))
        .route("/pickups/:id/manifest", get(manifest))
}

async fn create_pickup(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::CreatePickupRequest>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "pickups.create") {
        return r;
    }
    let Actor::Supplier(supplier_id) = actor else {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only suppliers may create pickups",
        );
    };

    let mut sub_order_ids = Vec::with_capacity(body.sub_order_ids.len());
    for raw in &body.sub_order_ids {
        match common::parse_aggregate_id(raw, "sub-order") {
            Ok(v) => sub_order_ids.push(SubOrderId::new(v)),
            Err(r) => return r,
        }
    }

    let metadata = match (body.package_count, body.total_weight_kg) {
        (None, None) => None,
        (package_count, total_weight_kg) => Some(PickupMetadata {
            package_count: package_count.unwrap_or(0),
            total_weight_kg,
        }),
    };

    match state
        .services
        .pickups
        .create_pickup(supplier_id, sub_order_ids, metadata)
    {
        Ok(pickup) => (StatusCode::CREATED, Json(pickup)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn confirm_collected(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "pickups.confirm_collected") {
        return r;
    }

    let pickup_id = match common::parse_aggregate_id(&id, "pickup") {
        Ok(v) => PickupId::new(v),
        Err(r) => return r,
    };

    if let Err(r) = check_pickup_access(&state, pickup_id, actor) {
        return r;
    }

    match state.services.pickups.confirm_collected(pickup_id) {
        Ok(pickup) => (StatusCode::OK, Json(pickup)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn manifest(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };

    let pickup_id = match common::parse_aggregate_id(&id, "pickup") {
        Ok(v) => PickupId::new(v),
        Err(r) => return r,
    };

    if let Err(r) = check_pickup_access(&state, pickup_id, actor) {
        return r;
    }

    match state.services.pickups.manifest(pickup_id) {
        Ok(manifest) => {
            let printable = manifest.to_plain_text();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "manifest": manifest,
                    "printable": printable,
                })),
            )
                .into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn check_pickup_access(
    state: &Arc<ApiState>,
    pickup_id: PickupId,
    actor: Actor,
) -> Result<(), axum::response::Response> {
    match (
        state.services.projections.pickup_log.supplier_of(pickup_id),
        actor,
    ) {
        (None, _) => Err(errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "unknown pickup",
        )),
        (Some(owner), Actor::Supplier(supplier_id)) if supplier_id != owner => {
            Err(errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "pickup belongs to another supplier",
            ))
        }
        (Some(_), Actor::Reseller(_)) => Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "resellers may not access pickups",
        )),
        _ => Ok(()),
    }
}
