//! `GET /subjects/:id/profile` (spec §2).

use crate::{error::ApiError, state::AppState};
use axum::extract::{Path, State};
use axum::Json;
use screening_core::{Error, ErrorCode, RequestContext, SubjectId};
use screening_engine::{ProfileStore, ProfileVersion};

pub async fn get_profile(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(subject_id): Path<SubjectId>,
) -> Result<Json<ProfileVersion>, ApiError> {
    let tenant_id = ctx
        .tenant_context
        .as_ref()
        .map(|t| t.tenant_id)
        .ok_or_else(|| Error::new(ErrorCode::AuthenticationRequired, "request is missing tenant context"))?;

    let profile = state
        .profile_store
        .latest_version(subject_id, tenant_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, format!("no profile for subject {subject_id}")))?;

    Ok(Json(profile))
}
