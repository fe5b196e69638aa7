//! Vigilance webhook intake (spec §4.14: "V3 ... plus event-driven webhooks
//! for sanctions and adverse media"). An upstream feed notifies this
//! endpoint that a subject may have a new hit; the handler runs that
//! subject's monitoring check immediately rather than waiting for its
//! regular cadence.

use crate::{error::ApiError, state::AppState};
use axum::extract::{Path, State};
use axum::Json;
use screening_core::{Error, ErrorCode, RequestContext, SubjectId};
use serde_json::{json, Value};

pub async fn trigger_vigilance_check(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(subject_id): Path<SubjectId>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = ctx
        .tenant_context
        .as_ref()
        .map(|t| t.tenant_id)
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "request is missing tenant context"))?;

    let triggered = state.vigilance.trigger_now(subject_id, tenant_id).await?;

    Ok(Json(json!({ "triggered": triggered })))
}
