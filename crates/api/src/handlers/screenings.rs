//! `POST /screenings`, `GET /screenings/:id` (spec §2, §6 `start_screening`).

use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use screening_core::{Error, ErrorCode, RequestContext, ScreeningId, SubjectId};
use screening_engine::{DeclaredIdentifiers, ProfileVersion, ServiceConfig, Subject, SubjectKind};
use screening_vigilance::MonitoringSchedule;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StartScreeningRequest {
    pub subject_kind: SubjectKind,
    #[serde(default)]
    pub declared: DeclaredIdentifiers,
    pub service_config: ServiceConfig,
    pub locale: String,
    pub role: String,
    pub correlation_id: String,
}

fn require_tenant(ctx: &RequestContext) -> Result<screening_core::TenantId, ApiError> {
    ctx.tenant_context
        .as_ref()
        .map(|t| t.tenant_id)
        .ok_or_else(|| {
            ApiError::from(Error::new(
                ErrorCode::AuthenticationRequired,
                "request is missing tenant context (x-tenant-id)",
            ))
        })
}

pub async fn start_screening(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<StartScreeningRequest>,
) -> Result<Json<ProfileVersion>, ApiError> {
    let tenant_id = require_tenant(&ctx)?;

    let subject = Subject {
        id: SubjectId::new(),
        kind: body.subject_kind,
        declared: body.declared,
        tenant_id,
    };
    state.subject_directory.remember(subject.clone());

    let request = screening_engine::ScreeningRequest {
        subject: subject.clone(),
        service_config: body.service_config,
        tenant_id,
        user_id: ctx.caller_id.clone().unwrap_or_else(|| "anonymous".to_string()),
        correlation_id: body.correlation_id,
        locale: body.locale.clone(),
        role: body.role.clone(),
        deadline: None,
    };

    let profile = state.engine.start_screening(request).await?;
    state.profile_store.save(profile.clone()).await?;

    if body.service_config.vigilance.cadence_days().is_some() {
        let schedule = MonitoringSchedule::new(
            subject.id,
            tenant_id,
            body.service_config.vigilance,
            profile.version,
            body.service_config,
            body.locale,
            body.role,
        );
        state.schedule_store.upsert(schedule).await?;
    }

    Ok(Json(profile))
}

pub async fn get_screening(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(screening_id): Path<ScreeningId>,
) -> Result<Json<ProfileVersion>, ApiError> {
    let tenant_id = require_tenant(&ctx)?;

    let profile = state
        .profile_store
        .find_by_screening_id(screening_id, tenant_id)
        .await?
        .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, format!("no screening {screening_id}")))?;

    Ok(Json(profile))
}
