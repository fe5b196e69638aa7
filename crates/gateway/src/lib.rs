pub mod cache;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod probe;
pub mod provider;
pub mod rate_limiter;
pub mod registry;

pub use cache::{CacheKey, CacheOrigin, CacheStore, CachedResponse, InMemoryCacheStore, PostgresCacheStore};
pub use executor::{QueryExecutor, QueryOutcome, QueryRequest};
pub use health::{CircuitState, HealthMonitor};
pub use metrics::GatewayMetrics;
pub use probe::HealthProbe;
pub use provider::{
    NormalizedRecord, NormalizedRecords, Provider, ProviderError, ProviderHealth, ProviderTierCategory,
    QueryParams, RawResponse,
};
pub use rate_limiter::RateLimiter;
pub use registry::ProviderRegistry;
