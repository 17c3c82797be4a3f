use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use dropmart_core::Actor;

/// Actor context for a request.
///
/// Authentication is out of scope: the upstream gateway verifies identity
/// and forwards it as `x-actor-role` / `x-actor-id` headers. Routes that
/// mutate state refuse to run without it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let role = headers.get("x-actor-role")?.to_str().ok()?;
        let id = headers.get("x-actor-id")?.to_str().ok()?;

        let actor = match role {
            "supplier" => Actor::Supplier(id.parse().ok()?),
            "reseller" => Actor::Reseller(id.parse().ok()?),
            "specialist" => Actor::Specialist(id.parse().ok()?),
            _ => return None,
        };

        Some(Self { actor })
    }
}

/// Middleware: attach the actor context when the identity headers parse.
///
/// Absence is not an error here — public read routes work without identity;
/// mutating handlers reject requests that carry no context.
pub async fn actor_context(mut req: Request, next: Next) -> Response {
    if let Some(ctx) = ActorContext::from_headers(req.headers()) {
        req.extensions_mut().insert(ctx);
    }
    next.run(req).await
}
