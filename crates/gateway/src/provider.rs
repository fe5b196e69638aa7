use async_trait::async_trait;
use chrono::{DateTime, Utc};
use screening_core::InformationType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Tier category a provider belongs to, used to order the registry's
/// per-check-type candidate list (primary sources ahead of synthesis-only
/// aggregators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderTierCategory {
    Authoritative,
    Aggregator,
    Synthesis,
}

/// Categorised failure modes a `Provider::query` call may return. Only
/// `Timeout`, `ServiceUnavailable` and `ProviderError` are retryable by the
/// executor; `RateLimited` is surfaced immediately so the executor can try a
/// fallback instead of retrying the same provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider authentication failed")]
    AuthFailure,
    #[error("provider rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("provider call timed out")]
    Timeout,
    #[error("provider service unavailable")]
    ServiceUnavailable,
    #[error("bad request to provider: {0}")]
    BadRequest(String),
    #[error("provider error: {0}")]
    ProviderError(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::ServiceUnavailable | ProviderError::ProviderError(_)
        )
    }
}

/// Opaque payload a provider returns before normalization. The engine never
/// interprets `raw` itself; only `Provider::normalize` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub provider_id: String,
    pub check_type: InformationType,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// A provider-normalized record, ready for the assessor to turn into typed
/// facts. `record_type` names the shape of `fields` (e.g. `"name_variant"`,
/// `"employer"`) in a provider-agnostic vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record_type: String,
    pub fields: Value,
    pub confidence: f64,
}

pub type NormalizedRecords = Vec<NormalizedRecord>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub latency_ms: u64,
    pub error_rate: f64,
}

/// Query parameters passed to a provider. Kept as a JSON bag rather than a
/// typed struct per check type since the parameter shape varies by provider
/// and is largely opaque to the engine beyond canonicalization for dedup.
pub type QueryParams = Value;

/// The abstract contract every external data source implements. The engine
/// only ever calls through this trait, never a concrete transport.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;
    fn supported_check_types(&self) -> &[InformationType];
    fn tier_category(&self) -> ProviderTierCategory;
    fn cost_per_query(&self) -> f64;
    fn rate_limit_per_minute(&self) -> u32;
    fn timeout(&self) -> Duration;
    /// Relative ordering within a tier category; lower runs first.
    fn priority(&self) -> u32 {
        100
    }

    async fn query(
        &self,
        check_type: InformationType,
        params: &QueryParams,
    ) -> Result<RawResponse, ProviderError>;

    fn normalize(&self, raw: &RawResponse) -> NormalizedRecords;

    async fn health_check(&self) -> ProviderHealth;
}
