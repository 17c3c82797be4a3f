use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use rust_decimal::Decimal;

use dropmart_catalog::{ProductId, VariationId, VariationSpec};
use dropmart_core::{Actor, AggregateId};

use crate::app::routes::common;
use crate::app::{ApiState, dto, errors};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/products", post(define_product))
        .route("/products/:id/replenish", post(replenish))
        .route("/products/:id/stock", get(stock_levels))
}

async fn define_product(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::DefineProductRequest>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "catalog.define_product") {
        return r;
    }
    let Actor::Supplier(supplier_id) = actor else {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only suppliers may define products",
        );
    };

    let variations: Vec<VariationSpec> = body
        .variations
        .into_iter()
        .map(|v| VariationSpec {
            variation_id: VariationId::new(AggregateId::new()),
            label: v.label,
            wholesale_price: v.wholesale_price,
            initial_stock: v.initial_stock,
        })
        .collect();

    match state.services.catalog.define_product(
        supplier_id,
        body.name,
        body.wholesale_price.unwrap_or(Decimal::ZERO),
        body.initial_stock.unwrap_or(0),
        variations,
    ) {
        Ok(levels) => (StatusCode::CREATED, Json(levels)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn replenish(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReplenishRequest>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "catalog.replenish") {
        return r;
    }

    let aggregate_id = match common::parse_aggregate_id(&id, "product") {
        Ok(v) => v,
        Err(r) => return r,
    };
    let product_id = ProductId::new(aggregate_id);

    // A supplier may only restock its own product.
    let owner = state
        .services
        .projections
        .stock_levels
        .supplier_of(product_id);
    match (owner, actor) {
        (None, _) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown product"),
        (Some(owner), Actor::Supplier(supplier_id)) if supplier_id != owner => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "product belongs to another supplier",
            );
        }
        (Some(_), Actor::Reseller(_)) => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "resellers may not restock products",
            );
        }
        _ => {}
    }

    let variation_id = match body.variation_id.as_deref() {
        None => None,
        Some(raw) => match common::parse_aggregate_id(raw, "variation") {
            Ok(v) => Some(VariationId::new(v)),
            Err(r) => return r,
        },
    };

    match state
        .services
        .catalog
        .replenish(product_id, variation_id, body.quantity)
    {
        Ok(levels) => (StatusCode::OK, Json(levels)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn stock_levels(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let aggregate_id = match common::parse_aggregate_id(&id, "product") {
        Ok(v) => v,
        Err(r) => return r,
    };

    match state
        .services
        .catalog
        .stock_levels(ProductId::new(aggregate_id))
    {
        Some(levels) => (StatusCode::OK, Json(levels)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "unknown product"),
    }
}
