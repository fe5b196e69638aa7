//! Postgres-backed `CacheStore`, mirroring `screening_core::database`'s
//! `DatabasePool`/`TenantPool` schema-per-tenant pattern. The row with the
//! greatest `acquired_at` for a `(subject_id, check_type, provider_id)` key
//! wins, matching the in-memory store's "most recent put" semantics.

use super::store::{CacheKey, CacheOrigin, CachedResponse};
use async_trait::async_trait;
use screening_core::{Error, InformationType, Result, SubjectId, TenantId, TenantPool};
use sqlx::Row;
use uuid::Uuid;

pub struct PostgresCacheStore {
    pool: TenantPool,
}

impl PostgresCacheStore {
    pub fn new(pool: TenantPool) -> Self {
        Self { pool }
    }
}

fn origin_to_str(origin: CacheOrigin) -> &'static str {
    match origin {
        CacheOrigin::PaidExternal => "paid_external",
        CacheOrigin::CustomerProvided => "customer_provided",
    }
}

fn origin_from_str(s: &str) -> Result<CacheOrigin> {
    match s {
        "paid_external" => Ok(CacheOrigin::PaidExternal),
        "customer_provided" => Ok(CacheOrigin::CustomerProvided),
        other => Err(Error::internal(format!("unknown cache origin: {other}"))),
    }
}

fn check_type_from_str(s: &str) -> Result<InformationType> {
    InformationType::ALL
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| Error::internal(format!("unknown check type: {s}")))
}

#[async_trait]
impl super::store::CacheStore for PostgresCacheStore {
    async fn get(
        &self,
        key: &CacheKey,
        caller_tenant: Option<TenantId>,
    ) -> Result<Option<CachedResponse>> {
        let sql = r#"
            SELECT subject_id, check_type, provider_id, origin, tenant_id,
                   acquired_at, fresh_until, stale_until, normalized, raw_encrypted, cost
            FROM cache_entries
            WHERE subject_id = $1 AND check_type = $2 AND provider_id = $3
            ORDER BY acquired_at DESC
            LIMIT 1
        "#;

        let row = sqlx::query(sql)
            .bind(key.subject_id.0)
            .bind(key.check_type.as_str())
            .bind(&key.provider_id)
            .fetch_optional(self.pool.get())
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let origin = origin_from_str(&row.get::<String, _>("origin"))?;
        let check_type = check_type_from_str(&row.get::<String, _>("check_type"))?;
        let tenant_id = row.get::<Option<Uuid>, _>("tenant_id").map(TenantId);

        if origin == CacheOrigin::CustomerProvided && tenant_id != caller_tenant {
            return Ok(None);
        }

        Ok(Some(CachedResponse {
            subject_id: SubjectId(row.get("subject_id")),
            check_type,
            provider_id: row.get("provider_id"),
            origin,
            tenant_id,
            acquired_at: row.get("acquired_at"),
            fresh_until: row.get("fresh_until"),
            stale_until: row.get("stale_until"),
            normalized: row.get("normalized"),
            raw_encrypted: row.get("raw_encrypted"),
            cost: row.get("cost"),
        }))
    }

    async fn put(&self, entry: CachedResponse) -> Result<()> {
        let sql = r#"
            INSERT INTO cache_entries
                (id, subject_id, check_type, provider_id, origin, tenant_id,
                 acquired_at, fresh_until, stale_until, normalized, raw_encrypted, cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#;

        sqlx::query(sql)
            .bind(Uuid::new_v4())
            .bind(entry.subject_id.0)
            .bind(entry.check_type.as_str())
            .bind(&entry.provider_id)
            .bind(origin_to_str(entry.origin))
            .bind(entry.tenant_id.map(|t| t.0))
            .bind(entry.acquired_at)
            .bind(entry.fresh_until)
            .bind(entry.stale_until)
            .bind(&entry.normalized)
            .bind(&entry.raw_encrypted)
            .bind(entry.cost)
            .execute(self.pool.get())
            .await?;

        Ok(())
    }
}
