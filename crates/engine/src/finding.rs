//! Finding extractor & classifier (spec §4.12): turns knowledge-base facts
//! and inconsistencies into typed, scored `Finding`s.

use crate::{
    assessor::{Inconsistency, InconsistencySeverity},
    fact::Fact,
    knowledge_base::KnowledgeBase,
};
use chrono::{DateTime, Utc};
use screening_core::{InformationType, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCategory {
    Criminal,
    Financial,
    Regulatory,
    Reputation,
    Verification,
    Behavioral,
    Network,
}

impl FindingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingCategory::Criminal => "CRIMINAL",
            FindingCategory::Financial => "FINANCIAL",
            FindingCategory::Regulatory => "REGULATORY",
            FindingCategory::Reputation => "REPUTATION",
            FindingCategory::Verification => "VERIFICATION",
            FindingCategory::Behavioral => "BEHAVIORAL",
            FindingCategory::Network => "NETWORK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub subject_id: SubjectId,
    pub category: FindingCategory,
    pub severity: Severity,
    pub confidence: f64,
    pub relevance_to_role: f64,
    pub summary: String,
    pub detail: String,
    pub sources: Vec<String>,
    pub corroborated: bool,
    pub finding_date: Option<DateTime<Utc>>,
    /// Set when every contributing source is a synthesis-only provider:
    /// the finding exists but must not drive an adverse action decision.
    pub usable_for_adverse_action: bool,
}

pub struct FindingExtractor;

/// `(confidence_cap, relevance_multiplier)` inputs the caller supplies per
/// finding; the oracle relevance lookup and synthesis-provider set are
/// resolved by the caller since they come from outbound collaborators.
pub struct ClassifierContext<'a> {
    pub synthesis_providers: &'a HashSet<String>,
    pub synthesis_confidence_cap: f64,
}

impl FindingExtractor {
    pub async fn extract(
        subject_id: SubjectId,
        info_type: InformationType,
        kb: &KnowledgeBase,
        inconsistencies: &[Inconsistency],
        relevance_multiplier: f64,
        ctx: &ClassifierContext<'_>,
    ) -> Vec<Finding> {
        let facts = kb.facts_for(info_type).await;
        let mut findings = Vec::new();

        for fact in &facts {
            if let Some((category, severity, summary, detail)) = classify_fact(info_type, fact) {
                findings.push(Self::build(subject_id, category, severity, fact, summary, detail, relevance_multiplier, ctx));
            }
        }

        for inconsistency in inconsistencies {
            findings.push(Self::from_inconsistency(subject_id, inconsistency, relevance_multiplier));
        }

        findings
    }

    fn build(
        subject_id: SubjectId,
        category: FindingCategory,
        severity: Severity,
        fact: &Fact,
        summary: String,
        detail: String,
        relevance_multiplier: f64,
        ctx: &ClassifierContext<'_>,
    ) -> Finding {
        let sources: Vec<String> = fact
            .source_provider
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        let corroborated = sources.len() >= 2;

        let authoritative_source = sources.iter().any(|s| !ctx.synthesis_providers.contains(s));
        let (confidence, usable_for_adverse_action) = if authoritative_source {
            (fact.confidence, true)
        } else {
            (fact.confidence.min(ctx.synthesis_confidence_cap), false)
        };

        Finding {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            category,
            severity,
            confidence,
            relevance_to_role: relevance_multiplier,
            summary,
            detail,
            sources,
            corroborated,
            finding_date: Some(fact.discovered_at),
            usable_for_adverse_action,
        }
    }

    fn from_inconsistency(subject_id: SubjectId, inconsistency: &Inconsistency, relevance_multiplier: f64) -> Finding {
        let severity = match inconsistency.severity {
            InconsistencySeverity::Low => Severity::Low,
            InconsistencySeverity::Medium => Severity::Medium,
            InconsistencySeverity::High => Severity::High,
        };

        Finding {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            category: FindingCategory::Verification,
            severity,
            confidence: inconsistency.deception_score,
            relevance_to_role: relevance_multiplier,
            summary: format!("conflicting {} claims", inconsistency.field),
            detail: format!(
                "claimed value canonicalizes to '{}', found '{}'",
                inconsistency.claimed, inconsistency.found
            ),
            sources: Vec::new(),
            corroborated: true,
            finding_date: Some(Utc::now()),
            usable_for_adverse_action: true,
        }
    }
}

/// Maps a knowledge-base fact to `(category, severity, summary, detail)`
/// per the extractor rules in spec §4.12 (felony -> HIGH unless
/// lookback-filtered, sanctions hit -> CRITICAL, …).
fn classify_fact(info_type: InformationType, fact: &Fact) -> Option<(FindingCategory, Severity, String, String)> {
    let detail = fact.value.to_string();

    match (info_type, fact.fact_type.as_str()) {
        (InformationType::Criminal, "criminal_record") => {
            let lookback_filtered = fact.value.get("lookback_filtered").and_then(|v| v.as_bool()).unwrap_or(false);
            let degree = fact.value.get("degree").and_then(|v| v.as_str()).unwrap_or("misdemeanor");
            let severity = if lookback_filtered {
                Severity::Low
            } else if degree == "felony" {
                Severity::High
            } else {
                Severity::Medium
            };
            Some((FindingCategory::Criminal, severity, "criminal record on file".into(), detail))
        }
        (InformationType::Sanctions, "sanction_match") => Some((
            FindingCategory::Regulatory,
            Severity::Critical,
            "sanctions list match".into(),
            detail,
        )),
        (InformationType::Financial, "bankruptcy" | "lien" | "judgment") => Some((
            FindingCategory::Financial,
            Severity::Medium,
            format!("{} on record", fact.fact_type),
            detail,
        )),
        (InformationType::Regulatory, "regulatory_action") => Some((
            FindingCategory::Regulatory,
            Severity::High,
            "regulatory enforcement action".into(),
            detail,
        )),
        (InformationType::Licenses, "license_revoked") => Some((
            FindingCategory::Regulatory,
            Severity::Medium,
            "license revocation on record".into(),
            detail,
        )),
        (InformationType::AdverseMedia, "adverse_media_hit") => {
            let severity_field = fact.value.get("severity").and_then(|v| v.as_str()).unwrap_or("medium");
            let severity = match severity_field {
                "critical" => Severity::Critical,
                "high" => Severity::High,
                "low" => Severity::Low,
                _ => Severity::Medium,
            };
            Some((FindingCategory::Reputation, severity, "adverse media coverage".into(), detail))
        }
        (InformationType::DigitalFootprint, "behavioral_flag") => Some((
            FindingCategory::Behavioral,
            Severity::Low,
            "digital footprint flag".into(),
            detail,
        )),
        (_, "network_risk") => Some((
            FindingCategory::Network,
            Severity::Medium,
            "high-risk network connection".into(),
            detail,
        )),
        (InformationType::Civil, "civil_judgment") => Some((
            FindingCategory::Financial,
            Severity::Medium,
            "civil judgment on record".into(),
            detail,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn felony_without_lookback_filter_is_high_severity() {
        let subject_id = SubjectId::new();
        let kb = KnowledgeBase::new();
        kb.record_facts(
            InformationType::Criminal,
            vec![Fact::new("criminal_record", json!({"degree": "felony"}), "p_auth", 0.9)],
        )
        .await;

        let ctx = ClassifierContext {
            synthesis_providers: &HashSet::new(),
            synthesis_confidence_cap: 0.8,
        };
        let findings = FindingExtractor::extract(subject_id, InformationType::Criminal, &kb, &[], 1.0, &ctx).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn synthesis_only_finding_is_confidence_capped_and_unusable() {
        let subject_id = SubjectId::new();
        let kb = KnowledgeBase::new();
        kb.record_facts(
            InformationType::Sanctions,
            vec![Fact::new("sanction_match", json!({"list": "OFAC"}), "p_synth", 0.99)],
        )
        .await;

        let mut synth = HashSet::new();
        synth.insert("p_synth".to_string());
        let ctx = ClassifierContext {
            synthesis_providers: &synth,
            synthesis_confidence_cap: 0.8,
        };
        let findings = FindingExtractor::extract(subject_id, InformationType::Sanctions, &kb, &[], 1.0, &ctx).await;
        assert_eq!(findings[0].confidence, 0.8);
        assert!(!findings[0].usable_for_adverse_action);
    }
}
