use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use screening_core::{InformationType, Result, SubjectId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Visibility of a cached provider response. `CustomerProvided` rows are
/// bound to one tenant; `PaidExternal` rows are shareable across tenants
/// for the same subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheOrigin {
    PaidExternal,
    CustomerProvided,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub subject_id: SubjectId,
    pub check_type: InformationType,
    pub provider_id: String,
    pub origin: CacheOrigin,
    pub tenant_id: Option<TenantId>,
    pub acquired_at: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub stale_until: DateTime<Utc>,
    pub normalized: Value,
    pub raw_encrypted: Vec<u8>,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: SubjectId,
    pub check_type: InformationType,
    pub provider_id: String,
}

/// Storage-agnostic cache of provider responses. The lookup key is
/// `(subject_id, check_type, provider_id)`; implementations must return the
/// most recently acquired row for that key and must omit
/// `customer_provided` rows whose `tenant_id` does not match the caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey, caller_tenant: Option<TenantId>) -> Result<Option<CachedResponse>>;
    async fn put(&self, entry: CachedResponse) -> Result<()>;
}

/// In-memory implementation for tests and single-node deployments. Most
/// recent `put` for a key wins, matching the Postgres-backed store's
/// "most recent row" lookup semantics.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<CacheKey, CachedResponse>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey, caller_tenant: Option<TenantId>) -> Result<Option<CachedResponse>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.origin == CacheOrigin::CustomerProvided && entry.tenant_id != caller_tenant {
            return Ok(None);
        }

        Ok(Some(entry.clone()))
    }

    async fn put(&self, entry: CachedResponse) -> Result<()> {
        let key = CacheKey {
            subject_id: entry.subject_id,
            check_type: entry.check_type,
            provider_id: entry.provider_id.clone(),
        };
        self.entries.insert(key, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tenant: Option<TenantId>) -> CachedResponse {
        CachedResponse {
            subject_id: SubjectId::new(),
            check_type: InformationType::Criminal,
            provider_id: "p1".to_string(),
            origin: CacheOrigin::CustomerProvided,
            tenant_id: tenant,
            acquired_at: Utc::now(),
            fresh_until: Utc::now(),
            stale_until: Utc::now(),
            normalized: serde_json::json!([]),
            raw_encrypted: Vec::new(),
            cost: 0.0,
        }
    }

    #[tokio::test]
    async fn customer_provided_rows_are_tenant_scoped() {
        let store = InMemoryCacheStore::new();
        let owner = TenantId::new();
        let entry = sample(Some(owner));
        let key = CacheKey {
            subject_id: entry.subject_id,
            check_type: entry.check_type,
            provider_id: entry.provider_id.clone(),
        };
        store.put(entry).await.unwrap();

        assert!(store.get(&key, Some(owner)).await.unwrap().is_some());
        assert!(store.get(&key, Some(TenantId::new())).await.unwrap().is_none());
        assert!(store.get(&key, None).await.unwrap().is_none());
    }
}
