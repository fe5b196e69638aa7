//! In-process demo providers that populate the `ProviderRegistry` the
//! composition root runs against. Concrete provider transports are an
//! explicit non-goal (spec.md §4.1 "Non-goals") — there is nothing to
//! integrate against. These stand-ins return deterministic, synthetic
//! records per information type so the binary is runnable end to end,
//! the same way the engine/vigilance test suites use `StubIdentityProvider`
//! fixtures rather than a real transport.

use async_trait::async_trait;
use chrono::Utc;
use screening_core::InformationType;
use screening_gateway::{
    NormalizedRecord, NormalizedRecords, Provider, ProviderError, ProviderHealth, ProviderTierCategory,
    QueryParams, RawResponse,
};
use std::time::Duration;

/// A single-check-type provider that always answers successfully with one
/// synthetic record. `tier_category`/`cost_per_query` vary per instance so
/// the registry's candidate ordering (authoritative before aggregator
/// before synthesis) is exercised with more than one demo source.
pub struct DemoProvider {
    id: &'static str,
    check_types: Vec<InformationType>,
    tier_category: ProviderTierCategory,
    cost_per_query: f64,
    record_type: &'static str,
}

impl DemoProvider {
    pub fn new(
        id: &'static str,
        check_types: Vec<InformationType>,
        tier_category: ProviderTierCategory,
        cost_per_query: f64,
        record_type: &'static str,
    ) -> Self {
        Self { id, check_types, tier_category, cost_per_query, record_type }
    }
}

#[async_trait]
impl Provider for DemoProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn supported_check_types(&self) -> &[InformationType] {
        &self.check_types
    }

    fn tier_category(&self) -> ProviderTierCategory {
        self.tier_category
    }

    fn cost_per_query(&self) -> f64 {
        self.cost_per_query
    }

    fn rate_limit_per_minute(&self) -> u32 {
        600
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn query(&self, check_type: InformationType, params: &QueryParams) -> Result<RawResponse, ProviderError> {
        Ok(RawResponse {
            provider_id: self.id.to_string(),
            check_type,
            payload: serde_json::json!({
                "record_type": self.record_type,
                "source": self.id,
                "echo": params,
            }),
            received_at: Utc::now(),
        })
    }

    fn normalize(&self, raw: &RawResponse) -> NormalizedRecords {
        vec![NormalizedRecord {
            record_type: self.record_type.to_string(),
            fields: raw.payload.clone(),
            confidence: match self.tier_category {
                ProviderTierCategory::Authoritative => 0.95,
                ProviderTierCategory::Aggregator => 0.8,
                ProviderTierCategory::Synthesis => 0.6,
            },
        }]
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth { available: true, latency_ms: 8, error_rate: 0.0 }
    }
}

/// Builds the demo provider set the composition root registers at startup:
/// one authoritative source per Foundation/Records type and one synthesis
/// aggregator covering the Intelligence types.
pub fn build_demo_providers() -> Vec<std::sync::Arc<dyn Provider>> {
    use InformationType::*;

    vec![
        std::sync::Arc::new(DemoProvider::new(
            "demo_identity",
            vec![Identity],
            ProviderTierCategory::Authoritative,
            0.10,
            "confirmed_identity",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_employment",
            vec![Employment],
            ProviderTierCategory::Authoritative,
            0.12,
            "employment_record",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_education",
            vec![Education],
            ProviderTierCategory::Aggregator,
            0.08,
            "education_record",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_criminal",
            vec![Criminal, Civil],
            ProviderTierCategory::Authoritative,
            0.25,
            "court_record",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_financial",
            vec![Financial, Licenses, Regulatory],
            ProviderTierCategory::Aggregator,
            0.15,
            "registry_record",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_sanctions",
            vec![Sanctions],
            ProviderTierCategory::Authoritative,
            0.20,
            "sanctions_list_hit",
        )),
        std::sync::Arc::new(DemoProvider::new(
            "demo_synthesis",
            vec![AdverseMedia, DigitalFootprint],
            ProviderTierCategory::Synthesis,
            0.05,
            "media_mention",
        )),
    ]
}
