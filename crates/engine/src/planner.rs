//! Query planner & refiner (spec §4.7): builds initial/enriched queries for
//! iteration 1, and gap-targeted queries for iteration ≥ 2.

use crate::{
    knowledge_base::KnowledgeSnapshot,
    query::{QueryKind, SearchQuery},
    subject::Subject,
};
use screening_core::InformationType;
use screening_gateway::ProviderRegistry;
use serde_json::json;
use std::collections::HashSet;

const MAX_COUNTIES: usize = 5;

pub struct QueryPlanner {
    registry: ProviderRegistry,
}

impl QueryPlanner {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Iteration-1 queries: `initial` params from the subject's declared
    /// identifiers, plus `enriched` params for the info types with a
    /// cross-type enrichment rule, using facts already confirmed by
    /// completed Foundation types.
    pub fn plan_initial(
        &self,
        info_type: InformationType,
        subject: &Subject,
        snapshot: &KnowledgeSnapshot,
        completed_types: &[InformationType],
    ) -> Vec<SearchQuery> {
        let candidates = self.registry.candidates_for(info_type);
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut queries = Vec::new();
        let mut seen = HashSet::new();

        let enrichment = enrichment_params(info_type, subject, snapshot);

        for provider in &candidates {
            let (kind, params_list, sources): (QueryKind, Vec<serde_json::Value>, Vec<InformationType>) =
                match enrichment {
                    Some((ref params_list, ref sources)) if !completed_types.is_empty() => {
                        (QueryKind::Enriched, params_list.clone(), sources.clone())
                    }
                    _ => (QueryKind::Initial, vec![initial_params(subject)], Vec::new()),
                };

            for params in params_list {
                let mut q = SearchQuery::new(info_type, kind, provider.id(), params, 1);
                q.enrichment_sources = sources.clone();
                let key = (provider.id().to_string(), q.dedup_key());
                if seen.insert(key) {
                    queries.push(q);
                }
            }
        }

        queries
    }

    /// Iteration ≥ 2: one `gap_fill` query per `(gap, provider)`,
    /// duplicate `(provider, canonicalised params)` pairs within the
    /// iteration collapsed.
    pub fn plan_gap_fill(
        &self,
        info_type: InformationType,
        gaps: &[String],
        iteration: u32,
    ) -> Vec<SearchQuery> {
        let candidates = self.registry.candidates_for(info_type);
        let mut queries = Vec::new();
        let mut seen = HashSet::new();

        for gap in gaps {
            for provider in &candidates {
                let mut q = SearchQuery::new(
                    info_type,
                    QueryKind::GapFill,
                    provider.id(),
                    json!({ "gap": gap }),
                    iteration,
                );
                q.targeted_gap = Some(gap.clone());

                let key = (provider.id().to_string(), q.dedup_key());
                if seen.insert(key) {
                    queries.push(q);
                }
            }
        }

        queries
    }
}

fn initial_params(subject: &Subject) -> serde_json::Value {
    json!({
        "names": subject.declared.names,
        "date_of_birth": subject.declared.date_of_birth,
        "addresses": subject.declared.addresses,
        "tax_id": subject.declared.tax_id,
    })
}

/// Returns `(one params object per enrichment unit, contributing types)`
/// for the info types with a cross-type enrichment rule (spec §4.7); `None`
/// for info types that only ever use subject-declared data.
fn enrichment_params(
    info_type: InformationType,
    subject: &Subject,
    snapshot: &KnowledgeSnapshot,
) -> Option<(Vec<serde_json::Value>, Vec<InformationType>)> {
    match info_type {
        InformationType::Criminal => {
            let names = union(&snapshot.confirmed_names, &subject.declared.names);
            let counties: Vec<_> = snapshot.known_counties.iter().take(MAX_COUNTIES).cloned().collect();
            if counties.is_empty() {
                return Some((
                    vec![json!({
                        "names": names,
                        "date_of_birth": snapshot.confirmed_date_of_birth,
                    })],
                    vec![InformationType::Identity],
                ));
            }
            let params = counties
                .iter()
                .map(|county| {
                    json!({
                        "names": names,
                        "date_of_birth": snapshot.confirmed_date_of_birth,
                        "county": county,
                    })
                })
                .collect();
            Some((params, vec![InformationType::Identity]))
        }
        InformationType::Employment => Some((
            vec![json!({
                "names": union(&snapshot.confirmed_names, &subject.declared.names),
                "date_of_birth": snapshot.confirmed_date_of_birth,
                "addresses": union(&snapshot.addresses, &subject.declared.addresses),
            })],
            vec![InformationType::Identity],
        )),
        InformationType::AdverseMedia => {
            let mut subjects: Vec<String> = Vec::new();
            subjects.extend(union(&snapshot.confirmed_names, &subject.declared.names));
            subjects.extend(snapshot.employers.iter().cloned());
            subjects.extend(snapshot.schools.iter().cloned());
            Some((
                vec![json!({ "subjects": dedup(subjects) })],
                vec![InformationType::Identity, InformationType::Employment, InformationType::Education],
            ))
        }
        InformationType::Sanctions => Some((
            vec![json!({
                "names": union(&snapshot.confirmed_names, &subject.declared.names),
                "date_of_birth": snapshot.confirmed_date_of_birth,
            })],
            vec![InformationType::Identity],
        )),
        InformationType::DigitalFootprint => Some((
            vec![json!({
                "emails": union(&snapshot.emails, &subject.declared.emails),
                "usernames": snapshot.usernames,
                "names": union(&snapshot.confirmed_names, &subject.declared.names),
            })],
            vec![InformationType::Identity],
        )),
        _ => None,
    }
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    dedup(a.iter().cloned().chain(b.iter().cloned()).collect())
}

fn dedup(mut items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::{DeclaredIdentifiers, SubjectKind};
    use async_trait::async_trait;
    use screening_core::SubjectId;
    use screening_gateway::{
        NormalizedRecords, Provider, ProviderError, ProviderHealth, ProviderTierCategory, QueryParams,
        RawResponse,
    };
    use std::{sync::Arc, time::Duration};

    struct StubProvider(&'static str, InformationType);

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            self.0
        }
        fn supported_check_types(&self) -> &[InformationType] {
            std::slice::from_ref(&self.1)
        }
        fn tier_category(&self) -> ProviderTierCategory {
            ProviderTierCategory::Authoritative
        }
        fn cost_per_query(&self) -> f64 {
            1.0
        }
        fn rate_limit_per_minute(&self) -> u32 {
            60
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn query(&self, _: InformationType, _: &QueryParams) -> Result<RawResponse, ProviderError> {
            unimplemented!()
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            Vec::new()
        }
        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth { available: true, latency_ms: 0, error_rate: 0.0 }
        }
    }

    fn subject() -> Subject {
        Subject {
            id: SubjectId::new(),
            kind: SubjectKind::Individual,
            declared: DeclaredIdentifiers {
                names: vec!["Jane Roe".into()],
                ..Default::default()
            },
            tenant_id: screening_core::TenantId::new(),
        }
    }

    #[test]
    fn criminal_enrichment_caps_at_five_counties() {
        let registry = ProviderRegistry::new(vec![Arc::new(StubProvider("p_crim", InformationType::Criminal))]);
        let planner = QueryPlanner::new(registry);

        let mut snapshot = KnowledgeSnapshot::default();
        snapshot.confirmed_names = vec!["Jane Roe".into()];
        snapshot.known_counties = (0..8).map(|i| format!("County{i}")).collect();

        let queries = planner.plan_initial(
            InformationType::Criminal,
            &subject(),
            &snapshot,
            &[InformationType::Identity],
        );
        assert_eq!(queries.len(), 5);
        assert!(queries.iter().all(|q| q.kind == QueryKind::Enriched));
    }

    #[test]
    fn gap_fill_collapses_duplicates() {
        let registry = ProviderRegistry::new(vec![Arc::new(StubProvider("p_emp", InformationType::Employment))]);
        let planner = QueryPlanner::new(registry);

        let gaps = vec!["employment_end_date_missing:Acme".to_string()];
        let queries = planner.plan_gap_fill(InformationType::Employment, &gaps, 2);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].kind, QueryKind::GapFill);
    }
}
