use std::sync::Arc;

use axum::{
    Extension, Json, Router, http::StatusCode, response::IntoResponse, routing::post,
};
use rust_decimal::Decimal;

use dropmart_catalog::{ProductId, VariationId};
use dropmart_core::Actor;
use dropmart_orders::{CheckoutCart, CheckoutLine, ClientInfo};

use crate::app::routes::common;
use crate::app::{ApiState, dto, errors};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new().route("/checkout", post(checkout))
}

async fn checkout(
    Extension(state): Extension<Arc<ApiState>>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let actor = match common::require_actor(actor) {
        Ok(a) => a,
        Err(r) => return r,
    };
    if let Err(r) = authz::authorize(state.gate.as_ref(), &actor, "checkout.create") {
        return r;
    }
    let Actor::Reseller(reseller_id) = actor else {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only resellers may check out a cart",
        );
    };

    let mut lines = Vec::with_capacity(body.lines.len());
    for line in &body.lines {
        let product_id = match common::parse_aggregate_id(&line.product_id, "product") {
            Ok(v) => ProductId::new(v),
            Err(r) => return r,
        };
        let variation_id = match line.variation_id.as_deref() {
            None => None,
            Some(raw) => match common::parse_aggregate_id(raw, "variation") {
                Ok(v) => Some(VariationId::new(v)),
                Err(r) => return r,
            },
        };
        lines.push(CheckoutLine {
            product_id,
            variation_id,
            quantity: line.quantity,
            unit_sale_price: line.unit_sale_price,
        });
    }

    let cart = CheckoutCart {
        reseller_id,
        client: ClientInfo {
            name: body.client.name,
            phone: body.client.phone,
            address: body.client.address,
        },
        lines,
        delivery_fee: body.delivery_fee,
        platform_fee: body.platform_fee.unwrap_or(Decimal::ZERO),
    };

    match state.services.checkout.checkout(cart) {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
