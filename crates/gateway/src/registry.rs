//! Provider registry: maps provider ids and check types to `Provider`
//! implementations. Populated once at startup and read concurrently
//! thereafter, in the manner of `screening_core::database::DatabasePool`'s
//! tenant pool cache — a `DashMap` filled on construction, never mutated
//! under normal operation, safe under unsynchronized concurrent reads.

use crate::provider::Provider;
use dashmap::DashMap;
use screening_core::InformationType;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderRegistry {
    by_id: Arc<DashMap<String, Arc<dyn Provider>>>,
    by_check_type: Arc<DashMap<InformationType, Vec<Arc<dyn Provider>>>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let by_id = DashMap::new();
        let by_check_type: DashMap<InformationType, Vec<Arc<dyn Provider>>> = DashMap::new();

        for provider in providers {
            by_id.insert(provider.id().to_string(), Arc::clone(&provider));

            for check_type in provider.supported_check_types() {
                by_check_type
                    .entry(*check_type)
                    .or_default()
                    .push(Arc::clone(&provider));
            }
        }

        for mut entry in by_check_type.iter_mut() {
            entry.sort_by_key(|p| (p.tier_category(), p.priority()));
        }

        Self {
            by_id: Arc::new(by_id),
            by_check_type: Arc::new(by_check_type),
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.by_id.get(provider_id).map(|p| Arc::clone(&p))
    }

    /// Every registered provider, for the periodic health-check probe to
    /// sweep. Order is unspecified.
    pub fn all(&self) -> Vec<Arc<dyn Provider>> {
        self.by_id.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Ordered candidates for a check type: tier category first, then
    /// declared priority within the tier.
    pub fn candidates_for(&self, check_type: InformationType) -> Vec<Arc<dyn Provider>> {
        self.by_check_type
            .get(&check_type)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// The next untried provider for a check type that is currently
    /// available, used by the executor's fallback substitution step.
    pub fn next_available(
        &self,
        check_type: InformationType,
        tried: &[String],
        is_available: impl Fn(&str) -> bool,
    ) -> Option<Arc<dyn Provider>> {
        self.candidates_for(check_type)
            .into_iter()
            .find(|p| !tried.contains(&p.id().to_string()) && is_available(p.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        NormalizedRecords, ProviderError, ProviderHealth, ProviderTierCategory, QueryParams,
        RawResponse,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubProvider {
        id: &'static str,
        types: Vec<InformationType>,
        tier: ProviderTierCategory,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn supported_check_types(&self) -> &[InformationType] {
            &self.types
        }
        fn tier_category(&self) -> ProviderTierCategory {
            self.tier
        }
        fn cost_per_query(&self) -> f64 {
            0.0
        }
        fn rate_limit_per_minute(&self) -> u32 {
            60
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn query(
            &self,
            _check_type: InformationType,
            _params: &QueryParams,
        ) -> Result<RawResponse, ProviderError> {
            unimplemented!()
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            Vec::new()
        }
        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth {
                available: true,
                latency_ms: 0,
                error_rate: 0.0,
            }
        }
    }

    #[test]
    fn orders_authoritative_before_synthesis() {
        let registry = ProviderRegistry::new(vec![
            Arc::new(StubProvider {
                id: "p_synth",
                types: vec![InformationType::Criminal],
                tier: ProviderTierCategory::Synthesis,
            }),
            Arc::new(StubProvider {
                id: "p_auth",
                types: vec![InformationType::Criminal],
                tier: ProviderTierCategory::Authoritative,
            }),
        ]);

        let candidates = registry.candidates_for(InformationType::Criminal);
        assert_eq!(candidates[0].id(), "p_auth");
        assert_eq!(candidates[1].id(), "p_synth");
    }
}
