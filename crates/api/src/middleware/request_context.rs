//! Request context middleware: the API surface's only stand-in for the
//! authentication/tenant-resolution layer that sits in front of it in
//! production (spec §2 "already authenticated upstream"). Resolves
//! `screening_core::RequestContext` from headers and inserts it into the
//! request extensions, where the `FromRequestParts` impl on
//! `RequestContext` picks it up for handlers.
//!
//! Modeled on the teacher's `request_id_middleware` /
//! `tenant_context_middleware` pair, collapsed into one pass since this
//! surface carries no auth/CORS logic to keep separate from it.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use screening_core::{RequestContext, TenantContext, TenantId};
use tracing::warn;
use uuid::Uuid;

pub async fn request_context_middleware(headers: HeaderMap, mut req: Request, next: Next) -> Response {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut ctx = RequestContext::new().with_request_id(request_id);

    if let Some(caller_id) = headers.get("x-caller-id").and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_caller_id(caller_id.to_string());
    }

    if let Some(tenant_id) = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        let tenant_id = TenantId(tenant_id);
        // No per-tenant schema isolation here: `CachedResponse`/`ProfileVersion`
        // rows live in one shared `platform_shared` schema, tenant-scoped by
        // the `tenant_id` column rather than by schema (see main.rs,
        // DESIGN.md). `schema_name` is carried on `TenantContext` only
        // because the type is shared with `DatabasePool`'s tenant-pool
        // lookup, not because this request is routed to a tenant-specific
        // schema.
        ctx = ctx.with_tenant_context(TenantContext {
            tenant_id,
            schema_name: crate::PLATFORM_SCHEMA.to_string(),
        });
    } else {
        warn!("request without an x-tenant-id header");
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
