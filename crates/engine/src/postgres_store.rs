//! Postgres-backed `ProfileStore`, mirroring
//! `screening_gateway::cache::postgres::PostgresCacheStore`'s shape: indexed
//! lookup columns plus a JSON payload for the parts of `ProfileVersion` no
//! query needs to filter on. Modeled on the teacher's
//! `DatabaseAuditRepository` for the insert-then-select-back pattern an
//! append-only, per-tenant log calls for.

use crate::screening::{ProfileStore, ProfileVersion};
use async_trait::async_trait;
use screening_core::{Result, ScreeningId, SubjectId, TenantId, TenantPool};
use sqlx::Row;
use uuid::Uuid;

pub struct PostgresProfileStore {
    pool: TenantPool,
}

impl PostgresProfileStore {
    pub fn new(pool: TenantPool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &sqlx::postgres::PgRow) -> Result<ProfileVersion> {
    let payload: serde_json::Value = row.get("payload");
    serde_json::from_value(payload).map_err(Into::into)
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn latest_version(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Option<ProfileVersion>> {
        let row = sqlx::query(
            r#"
            SELECT payload FROM profile_versions
            WHERE subject_id = $1 AND tenant_id = $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(subject_id.0)
        .bind(tenant_id.0)
        .fetch_optional(self.pool.get())
        .await?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn save(&self, profile: ProfileVersion) -> Result<()> {
        let payload = serde_json::to_value(&profile)?;
        sqlx::query(
            r#"
            INSERT INTO profile_versions
                (id, screening_id, subject_id, tenant_id, version, created_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(profile.screening_id.0)
        .bind(profile.subject_id.0)
        .bind(profile.tenant_id.0)
        .bind(profile.version as i32)
        .bind(profile.created_at)
        .bind(payload)
        .execute(self.pool.get())
        .await?;

        Ok(())
    }

    async fn find_by_screening_id(
        &self,
        screening_id: ScreeningId,
        tenant_id: TenantId,
    ) -> Result<Option<ProfileVersion>> {
        let row = sqlx::query(
            r#"
            SELECT payload FROM profile_versions
            WHERE screening_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(screening_id.0)
        .bind(tenant_id.0)
        .fetch_optional(self.pool.get())
        .await?;

        row.as_ref().map(row_to_profile).transpose()
    }
}
