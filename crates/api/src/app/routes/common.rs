use axum::Extension;
use axum::http::StatusCode;
use axum::response::Response;

use dropmart_core::{Actor, AggregateId};

use crate::app::errors;
use crate::context::ActorContext;

/// Mutating routes require a verified actor.
pub fn require_actor(actor: Option<Extension<ActorContext>>) -> Result<Actor, Response> {
    match actor {
        Some(Extension(ctx)) => Ok(ctx.actor()),
        None => Err(errors::unauthenticated()),
    }
}

pub fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}
