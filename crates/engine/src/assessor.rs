//! Result assessor (spec §4.8): fact extraction, confidence scoring, gap
//! identification, inconsistency detection, entity discovery. The
//! assessor is the only writer to the knowledge base.

use crate::{
    entity::{Entity, EntityKind},
    fact::Fact,
    knowledge_base::KnowledgeBase,
    query::{QueryResult, QueryStatus},
};
use screening_core::InformationType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InconsistencySeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inconsistency {
    pub field: String,
    pub claimed: String,
    pub found: String,
    pub severity: InconsistencySeverity,
    pub deception_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub info_type: InformationType,
    pub new_facts: Vec<Fact>,
    pub cumulative_fact_count: u32,
    pub confidence_score: f64,
    pub gaps: Vec<String>,
    pub inconsistencies: Vec<Inconsistency>,
    pub entities: Vec<Entity>,
    pub successful_queries: u32,
    pub total_queries: u32,
}

/// Expected fact count used by the `completeness` confidence factor,
/// calibrated per information type (identity needs few corroborating facts
/// to feel complete; criminal records need many county-level hits).
fn expected_facts_for_type(info_type: InformationType) -> f64 {
    match info_type {
        InformationType::Identity => 3.0,
        InformationType::Criminal => 5.0,
        InformationType::Civil => 4.0,
        InformationType::Employment => 3.0,
        InformationType::Education => 2.0,
        InformationType::Financial => 4.0,
        InformationType::Licenses => 2.0,
        InformationType::Regulatory => 3.0,
        InformationType::Sanctions => 2.0,
        InformationType::AdverseMedia => 4.0,
        InformationType::DigitalFootprint => 4.0,
    }
}

pub struct ResultAssessor;

impl ResultAssessor {
    /// Assesses one iteration's results for an information type, merges
    /// extracted facts into the knowledge base, and returns the resulting
    /// `Assessment`.
    pub async fn assess(
        info_type: InformationType,
        results: &[QueryResult],
        kb: &KnowledgeBase,
    ) -> Assessment {
        let extracted = Self::extract_facts(results);
        let new_facts = kb.record_facts(info_type, extracted).await;

        let all_facts = kb.facts_for(info_type).await;
        let cumulative_fact_count = all_facts.len() as u32;

        let total_queries = results.len() as u32;
        let successful_queries = results
            .iter()
            .filter(|r| r.status == QueryStatus::Success)
            .count() as u32;

        let confidence_score = Self::confidence_score(info_type, &all_facts, total_queries, successful_queries);
        let gaps = Self::identify_gaps(info_type, &all_facts);
        let inconsistencies = Self::detect_inconsistencies(&all_facts);
        let entities = Self::discover_entities(&new_facts);

        Assessment {
            info_type,
            new_facts,
            cumulative_fact_count,
            confidence_score,
            gaps,
            inconsistencies,
            entities,
            successful_queries,
            total_queries,
        }
    }

    fn extract_facts(results: &[QueryResult]) -> Vec<Fact> {
        let mut facts = Vec::new();
        for result in results {
            if result.status != QueryStatus::Success {
                continue;
            }
            let Some(records) = &result.raw else { continue };
            for record in records {
                facts.push(Fact::new(
                    record.record_type.clone(),
                    record.fields.clone(),
                    result.provider_id.clone(),
                    record.confidence,
                ));
            }
        }
        facts
    }

    fn confidence_score(
        info_type: InformationType,
        facts: &[Fact],
        total_queries: u32,
        successful_queries: u32,
    ) -> f64 {
        let completeness = (facts.len() as f64 / expected_facts_for_type(info_type)).min(1.0);

        let corroboration = if facts.is_empty() {
            0.0
        } else {
            let corroborated = facts.iter().filter(|f| KnowledgeBase::source_count(f) >= 2).count();
            corroborated as f64 / facts.len() as f64
        };

        let query_success = if total_queries == 0 {
            0.0
        } else {
            successful_queries as f64 / total_queries as f64
        };

        let fact_confidence = if facts.is_empty() {
            0.0
        } else {
            facts.iter().map(|f| f.confidence).sum::<f64>() / facts.len() as f64
        };

        0.35 * completeness + 0.30 * corroboration + 0.20 * query_success + 0.15 * fact_confidence
    }

    fn identify_gaps(info_type: InformationType, facts: &[Fact]) -> Vec<String> {
        let mut gaps = Vec::new();

        match info_type {
            InformationType::Employment => {
                for fact in facts.iter().filter(|f| f.fact_type == "employer") {
                    let has_end_date = fact
                        .value
                        .get("end_date")
                        .map(|v| !v.is_null())
                        .unwrap_or(false);
                    if !has_end_date {
                        let name = fact.value.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
                        gaps.push(format!("employment_end_date_missing:{name}"));
                    }
                }
            }
            InformationType::Education => {
                if !facts.iter().any(|f| f.fact_type == "degree" && f.confidence >= 0.6) {
                    gaps.push("no_education_verified".to_string());
                }
            }
            InformationType::Identity => {
                if facts.iter().all(|f| f.fact_type != "date_of_birth") {
                    gaps.push("date_of_birth_unconfirmed".to_string());
                }
            }
            InformationType::Criminal | InformationType::Civil | InformationType::Financial => {
                if facts.is_empty() {
                    gaps.push(format!("no_{}_records_found", info_type.as_str().to_lowercase()));
                }
            }
            InformationType::Licenses => {
                if facts.iter().all(|f| f.fact_type != "license_number") {
                    gaps.push("no_license_verified".to_string());
                }
            }
            InformationType::Regulatory | InformationType::Sanctions => {
                if facts.is_empty() {
                    gaps.push(format!("no_{}_hits_checked", info_type.as_str().to_lowercase()));
                }
            }
            InformationType::AdverseMedia | InformationType::DigitalFootprint => {
                if facts.len() < 2 {
                    gaps.push("low_coverage".to_string());
                }
            }
        }

        gaps
    }

    /// Within each `fact_type` group, distinct canonical values claimed by
    /// independent sources are conflicting claims.
    fn detect_inconsistencies(facts: &[Fact]) -> Vec<Inconsistency> {
        let mut groups: HashMap<&str, Vec<&Fact>> = HashMap::new();
        for fact in facts {
            groups.entry(fact.fact_type.as_str()).or_default().push(fact);
        }

        let mut out = Vec::new();
        for (field, group) in groups {
            if group.len() < 2 {
                continue;
            }
            let distinct_values: HashMap<String, &Fact> = group
                .iter()
                .map(|f| (f.identity().1, *f))
                .collect();

            if distinct_values.len() > 1 {
                let mut values: Vec<_> = distinct_values.into_iter().collect();
                values.sort_by(|a, b| a.0.cmp(&b.0));
                let (claimed_key, claimed_fact) = &values[0];
                for (found_key, found_fact) in &values[1..] {
                    let severity = if claimed_fact.confidence > 0.7 && found_fact.confidence > 0.7 {
                        InconsistencySeverity::High
                    } else {
                        InconsistencySeverity::Medium
                    };
                    let deception_score = (claimed_fact.confidence + found_fact.confidence) / 2.0;
                    out.push(Inconsistency {
                        field: field.to_string(),
                        claimed: claimed_key.clone(),
                        found: found_key.clone(),
                        severity,
                        deception_score,
                    });
                }
            }
        }

        out
    }

    fn discover_entities(new_facts: &[Fact]) -> Vec<Entity> {
        new_facts
            .iter()
            .filter_map(|f| {
                let kind = match f.fact_type.as_str() {
                    "employer" => EntityKind::Organization,
                    "associate" => EntityKind::Person,
                    _ => return None,
                };
                let name = match &f.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                };
                if name.is_empty() {
                    return None;
                }
                Some(Entity {
                    name,
                    kind,
                    source_fact_type: f.fact_type.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screening_gateway::NormalizedRecord;
    use serde_json::json;

    fn success(record_type: &str, fields: serde_json::Value, confidence: f64, provider: &str) -> QueryResult {
        QueryResult {
            query_id: uuid::Uuid::new_v4().to_string(),
            provider_id: provider.to_string(),
            status: QueryStatus::Success,
            raw: Some(vec![NormalizedRecord {
                record_type: record_type.to_string(),
                fields,
                confidence,
            }]),
            latency_ms: 10,
            retry_count: 0,
            error: None,
            stale: false,
        }
    }

    #[tokio::test]
    async fn employment_gap_reported_when_no_end_date() {
        let kb = KnowledgeBase::new();
        let results = vec![success(
            "employer",
            json!({"name": "Acme Corp", "end_date": null}),
            0.9,
            "p_emp",
        )];
        let assessment = ResultAssessor::assess(InformationType::Employment, &results, &kb).await;
        assert!(assessment.gaps.contains(&"employment_end_date_missing:Acme Corp".to_string()));
    }

    #[tokio::test]
    async fn conflicting_dob_from_independent_sources_flags_inconsistency() {
        let kb = KnowledgeBase::new();
        let results = vec![
            success("date_of_birth", json!("1980-01-01"), 0.9, "p1"),
            success("date_of_birth", json!("1982-05-05"), 0.85, "p2"),
        ];
        let assessment = ResultAssessor::assess(InformationType::Identity, &results, &kb).await;
        assert_eq!(assessment.inconsistencies.len(), 1);
    }

    #[tokio::test]
    async fn confidence_score_is_in_unit_range() {
        let kb = KnowledgeBase::new();
        let results = vec![success("name_variant", json!("Jane Roe"), 0.95, "p1")];
        let assessment = ResultAssessor::assess(InformationType::Identity, &results, &kb).await;
        assert!(assessment.confidence_score >= 0.0 && assessment.confidence_score <= 1.0);
    }
}
