//! Query executor: the cache -> rate-limit -> circuit -> dispatch -> retry ->
//! fallback -> cache-write chain every provider call runs through.
//!
//! Modeled on `screening_core::jobs::JobExecutor`'s worker loop in spirit
//! (bounded concurrency via the rate limiter's admission gate rather than a
//! `Semaphore`, structured `tracing` at each step, outcomes fed to both the
//! health registry and, when configured, `GatewayMetrics`).

use crate::{
    cache::{self, CacheKey, CacheOrigin, CacheStore, CachedResponse, ServiceTier},
    health::HealthMonitor,
    metrics::GatewayMetrics,
    provider::{NormalizedRecords, ProviderError, QueryParams},
    registry::ProviderRegistry,
};
use dashmap::DashMap;
use screening_core::{
    audit::{AuditEvent, AuditLogger, EventOutcome, EventSeverity, EventType},
    security::EncryptionService,
    Error, InformationType, Result, SubjectId, TenantId,
};
use std::{collections::HashMap, sync::Arc, time::Duration, time::Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const RETRY_BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(15)];
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub subject_id: SubjectId,
    pub check_type: InformationType,
    pub tenant_id: Option<TenantId>,
    pub tier: ServiceTier,
    pub params: QueryParams,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub provider_id: String,
    pub records: NormalizedRecords,
    pub from_cache: bool,
    pub stale: bool,
    pub cost: f64,
}

/// Per-`(subject_id, check_type)` build locks, one per key, so concurrent
/// callers wanting the same cache slot coalesce onto a single live provider
/// call (spec §5 "at-most-one concurrent build per key"; §8 testable
/// property 3). Granularity is `(subject_id, check_type)` rather than the
/// full `(subject_id, check_type, provider_id)` cache key because the
/// provider for a fresh build isn't chosen until candidate selection runs
/// inside the held lock — the same two callers racing to fill this slot
/// would otherwise pick the same first provider anyway.
type BuildLocks = Arc<DashMap<(SubjectId, InformationType), Arc<Mutex<()>>>>;

#[derive(Clone)]
pub struct QueryExecutor {
    registry: ProviderRegistry,
    rate_limiter: crate::rate_limiter::RateLimiter,
    health: HealthMonitor,
    cache: Arc<dyn CacheStore>,
    audit: Option<Arc<AuditLogger>>,
    encryption: Option<Arc<EncryptionService>>,
    metrics: Option<Arc<GatewayMetrics>>,
    build_locks: BuildLocks,
}

impl QueryExecutor {
    pub fn new(
        registry: ProviderRegistry,
        rate_limiter: crate::rate_limiter::RateLimiter,
        health: HealthMonitor,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            registry,
            rate_limiter,
            health,
            cache,
            audit: None,
            encryption: None,
            metrics: None,
            build_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Without an encryption service configured, raw provider payloads are
    /// persisted to the cache as plain JSON bytes — acceptable for the
    /// in-memory store and local development, never for a production
    /// Postgres-backed deployment.
    pub fn with_encryption(mut self, encryption: Arc<EncryptionService>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let candidates = self.registry.candidates_for(request.check_type);
        if candidates.is_empty() {
            return Err(Error::not_found(format!(
                "no provider registered for {}",
                request.check_type
            )));
        }

        if let Some(outcome) = self.try_cache(request, &candidates).await? {
            return Ok(outcome);
        }

        let lock = Arc::clone(
            self.build_locks
                .entry((request.subject_id, request.check_type))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let _guard = lock.lock().await;

        // Double-checked: another caller may have filled the cache while we
        // waited for the build lock.
        if let Some(outcome) = self.try_cache(request, &candidates).await? {
            return Ok(outcome);
        }
        self.emit(&request.tenant_id, EventType::CacheMiss, EventSeverity::Info, "cache miss, dispatching to providers").await;
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        let mut availability = HashMap::with_capacity(candidates.len());
        for provider in &candidates {
            let available = self.health.is_available(provider.id()).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_circuit_state(provider.id(), self.health.circuit_state(provider.id()).await);
            }
            availability.insert(provider.id().to_string(), available);
        }

        let mut tried = Vec::new();
        let mut last_err: Option<ProviderError> = None;
        // Shared across provider substitutions (spec §4.5 step 5: "the retry
        // counter continues across substitution") — the whole dispatch
        // sequence, fallbacks included, gets one `MAX_ATTEMPTS` budget, not
        // `MAX_ATTEMPTS` per provider tried.
        let mut attempt = 0usize;

        while let Some(provider) = self
            .registry
            .next_available(request.check_type, &tried, |id| {
                *availability.get(id).unwrap_or(&false)
            })
        {
            tried.push(provider.id().to_string());

            while attempt < MAX_ATTEMPTS {
                // While the circuit sits HALF_OPEN, only one caller may
                // actually dispatch (spec §4.3 "permit one probe"); losing
                // this race is handled like hitting an open circuit — fall
                // back without spending a retry attempt.
                if !self.health.try_admit(provider.id()).await {
                    break;
                }

                self.rate_limiter
                    .acquire(provider.id(), provider.rate_limit_per_minute())
                    .await;

                let started = Instant::now();
                let outcome = match tokio::time::timeout(
                    provider.timeout(),
                    provider.query(request.check_type, &request.params),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                };
                let latency_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(raw) => {
                        self.health.record_outcome(provider.id(), true, latency_ms).await;
                        if let Some(metrics) = &self.metrics {
                            metrics.record_call(provider.id(), true, latency_ms);
                            metrics.record_circuit_state(provider.id(), self.health.circuit_state(provider.id()).await);
                        }
                        let records = provider.normalize(&raw);
                        self.write_cache(request, provider.id(), provider.cost_per_query(), &records, &raw.payload)
                            .await?;
                        self.emit(
                            &request.tenant_id,
                            EventType::ProviderQueried,
                            EventSeverity::Info,
                            &format!("provider {} answered {}", provider.id(), request.check_type),
                        )
                        .await;
                        return Ok(QueryOutcome {
                            provider_id: provider.id().to_string(),
                            records,
                            from_cache: false,
                            stale: false,
                            cost: provider.cost_per_query(),
                        });
                    }
                    Err(err) => {
                        self.health.record_outcome(provider.id(), false, latency_ms).await;
                        if let Some(metrics) = &self.metrics {
                            metrics.record_call(provider.id(), false, latency_ms);
                            metrics.record_circuit_state(provider.id(), self.health.circuit_state(provider.id()).await);
                        }
                        warn!(provider = provider.id(), attempt, error = %err, "provider call failed");

                        let backoff_idx = attempt;
                        attempt += 1;
                        let retry_same_provider = err.is_retryable() && attempt < MAX_ATTEMPTS;
                        last_err = Some(err);

                        if retry_same_provider {
                            tokio::time::sleep(RETRY_BACKOFF[backoff_idx]).await;
                            continue;
                        }
                        break;
                    }
                }
            }

            availability.insert(provider.id().to_string(), self.health.is_available(provider.id()).await);

            if attempt >= MAX_ATTEMPTS {
                break;
            }
        }

        Err(last_err
            .map(|e| Error::provider_unavailable(e.to_string()))
            .unwrap_or_else(|| Error::provider_unavailable("no available provider for check type")))
    }

    async fn try_cache(
        &self,
        request: &QueryRequest,
        candidates: &[Arc<dyn crate::provider::Provider>],
    ) -> Result<Option<QueryOutcome>> {
        for provider in candidates {
            let key = CacheKey {
                subject_id: request.subject_id,
                check_type: request.check_type,
                provider_id: provider.id().to_string(),
            };

            let Some(cached) = self.cache.get(&key, request.tenant_id).await? else {
                continue;
            };

            let status = cache::classify(&cached, chrono_now());
            if let cache::ReuseDecision::UseCached { stale } =
                cache::reuse_decision(status, request.tier)
            {
                let _ = status;
                self.emit(
                    &request.tenant_id,
                    EventType::CacheHit,
                    EventSeverity::Info,
                    &format!("cache hit for {} via {}", request.check_type, provider.id()),
                )
                .await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit(stale);
                }
                if stale {
                    self.emit(
                        &request.tenant_id,
                        EventType::StaleDataServed,
                        EventSeverity::Warning,
                        &format!("stale cached {} served for {}", request.check_type, provider.id()),
                    )
                    .await;
                }

                let records: NormalizedRecords =
                    serde_json::from_value(cached.normalized.clone()).unwrap_or_default();

                return Ok(Some(QueryOutcome {
                    provider_id: cached.provider_id.clone(),
                    records,
                    from_cache: true,
                    stale,
                    cost: 0.0,
                }));
            }
        }

        Ok(None)
    }

    async fn write_cache(
        &self,
        request: &QueryRequest,
        provider_id: &str,
        cost: f64,
        records: &NormalizedRecords,
        raw_payload: &serde_json::Value,
    ) -> Result<()> {
        let (fresh_for, stale_for) = cache::default_ttl(request.check_type);
        let now = chrono_now();
        let raw_bytes = serde_json::to_vec(raw_payload).unwrap_or_default();
        let raw_encrypted = match &self.encryption {
            Some(encryption) => encryption.encrypt(&raw_bytes)?,
            None => raw_bytes,
        };

        self.cache
            .put(CachedResponse {
                subject_id: request.subject_id,
                check_type: request.check_type,
                provider_id: provider_id.to_string(),
                origin: CacheOrigin::PaidExternal,
                tenant_id: request.tenant_id,
                acquired_at: now,
                fresh_until: now + fresh_for,
                stale_until: now + stale_for,
                normalized: serde_json::to_value(records).unwrap_or_default(),
                raw_encrypted,
                cost,
            })
            .await
    }

    async fn emit(
        &self,
        tenant_id: &Option<TenantId>,
        event_type: EventType,
        severity: EventSeverity,
        description: &str,
    ) {
        let Some(audit) = &self.audit else {
            info!(%description, "executor event");
            return;
        };

        let mut builder = AuditEvent::builder(event_type, description.to_string())
            .severity(severity)
            .outcome(EventOutcome::Success);
        if let Some(tenant_id) = tenant_id {
            builder = builder.tenant_id(tenant_id.to_string());
        }

        if let Err(err) = audit.log_event(builder.build()).await {
            warn!(error = %err, "failed to record audit event");
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::InMemoryCacheStore,
        provider::{NormalizedRecord, Provider, ProviderHealth, ProviderTierCategory, RawResponse},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FailingProvider {
        id: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn supported_check_types(&self) -> &[InformationType] {
            &[InformationType::Employment]
        }
        fn tier_category(&self) -> ProviderTierCategory {
            ProviderTierCategory::Authoritative
        }
        fn cost_per_query(&self) -> f64 {
            1.0
        }
        fn rate_limit_per_minute(&self) -> u32 {
            600
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        fn priority(&self) -> u32 {
            0
        }
        async fn query(
            &self,
            _check_type: InformationType,
            _params: &QueryParams,
        ) -> std::result::Result<RawResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::ServiceUnavailable)
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            Vec::new()
        }
        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth { available: false, latency_ms: 0, error_rate: 1.0 }
        }
    }

    struct HealthyProvider {
        id: &'static str,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Provider for HealthyProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn supported_check_types(&self) -> &[InformationType] {
            &[InformationType::Employment]
        }
        fn tier_category(&self) -> ProviderTierCategory {
            ProviderTierCategory::Authoritative
        }
        fn cost_per_query(&self) -> f64 {
            1.0
        }
        fn rate_limit_per_minute(&self) -> u32 {
            600
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        fn priority(&self) -> u32 {
            1
        }
        async fn query(
            &self,
            check_type: InformationType,
            _params: &QueryParams,
        ) -> std::result::Result<RawResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse {
                provider_id: self.id.to_string(),
                check_type,
                payload: serde_json::json!({}),
                received_at: chrono_now(),
            })
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            vec![NormalizedRecord {
                record_type: "employer".to_string(),
                fields: serde_json::json!({"name": "Acme"}),
                confidence: 0.9,
            }]
        }
        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth { available: true, latency_ms: 5, error_rate: 0.0 }
        }
    }

    fn request(subject_id: SubjectId) -> QueryRequest {
        QueryRequest {
            subject_id,
            check_type: InformationType::Employment,
            tenant_id: None,
            tier: ServiceTier::Standard,
            params: serde_json::json!({}),
        }
    }

    /// S3: a provider with an open circuit (5 consecutive failures) is
    /// skipped entirely in favor of a healthy fallback.
    #[tokio::test]
    async fn open_circuit_falls_back_to_secondary_provider() {
        let primary = Arc::new(FailingProvider { id: "p_emp_primary", calls: AtomicU32::new(0) });
        let secondary = Arc::new(HealthyProvider { id: "p_emp_secondary", calls: AtomicU32::new(0) });
        let registry = ProviderRegistry::new(vec![primary.clone(), secondary.clone()]);
        let health = HealthMonitor::default();

        for _ in 0..5 {
            health.record_outcome("p_emp_primary", false, 10).await;
        }
        assert!(!health.is_available("p_emp_primary").await);

        let executor = QueryExecutor::new(
            registry,
            crate::rate_limiter::RateLimiter::default(),
            health,
            Arc::new(InMemoryCacheStore::default()),
        );

        let outcome = executor.execute(&request(SubjectId::new())).await.unwrap();
        assert_eq!(outcome.provider_id, "p_emp_secondary");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    /// Property 3: concurrent callers racing to fill the same
    /// `(subject_id, check_type)` slot coalesce onto one live provider call.
    #[tokio::test]
    async fn concurrent_callers_coalesce_onto_one_provider_call() {
        struct SlowProvider {
            calls: StdMutex<u32>,
        }

        #[async_trait]
        impl Provider for SlowProvider {
            fn id(&self) -> &str {
                "p_slow"
            }
            fn supported_check_types(&self) -> &[InformationType] {
                &[InformationType::Employment]
            }
            fn tier_category(&self) -> ProviderTierCategory {
                ProviderTierCategory::Authoritative
            }
            fn cost_per_query(&self) -> f64 {
                1.0
            }
            fn rate_limit_per_minute(&self) -> u32 {
                600
            }
            fn timeout(&self) -> Duration {
                Duration::from_secs(5)
            }
            async fn query(
                &self,
                check_type: InformationType,
                _params: &QueryParams,
            ) -> std::result::Result<RawResponse, ProviderError> {
                *self.calls.lock().unwrap() += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(RawResponse {
                    provider_id: "p_slow".to_string(),
                    check_type,
                    payload: serde_json::json!({}),
                    received_at: chrono_now(),
                })
            }
            fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
                vec![NormalizedRecord {
                    record_type: "employer".to_string(),
                    fields: serde_json::json!({"name": "Acme"}),
                    confidence: 0.9,
                }]
            }
            async fn health_check(&self) -> ProviderHealth {
                ProviderHealth { available: true, latency_ms: 5, error_rate: 0.0 }
            }
        }

        let provider = Arc::new(SlowProvider { calls: StdMutex::new(0) });
        let registry = ProviderRegistry::new(vec![provider.clone()]);
        let executor = Arc::new(QueryExecutor::new(
            registry,
            crate::rate_limiter::RateLimiter::default(),
            HealthMonitor::default(),
            Arc::new(InMemoryCacheStore::default()),
        ));

        let subject_id = SubjectId::new();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move { executor.execute(&request(subject_id)).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*provider.calls.lock().unwrap(), 1);
    }
}
