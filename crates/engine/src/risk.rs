//! Risk scorer (spec §4.13): composite scoring and recommendation. A pure
//! function of its findings — re-running it on the same input must yield
//! identical output (spec §8 testable property 8).

use crate::finding::{Finding, FindingCategory, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Proceed,
    ProceedWithCaution,
    ReviewRequired,
    DoNotProceed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub finding_id: String,
    pub category: FindingCategory,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub overall: f64,
    pub level: RiskLevel,
    /// Keyed by `FindingCategory::as_str()` rather than the enum directly —
    /// `serde_json` map keys must serialize as strings.
    pub per_category: HashMap<String, f64>,
    pub contributing_factors: Vec<ContributingFactor>,
    pub recommendation: Recommendation,
}

fn severity_base(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 10.0,
        Severity::Medium => 25.0,
        Severity::High => 50.0,
        Severity::Critical => 75.0,
    }
}

fn recency_factor(finding_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(date) = finding_date else { return 0.8 };
    let age_days = (now - date).num_days().max(0);
    if age_days <= 365 {
        1.0
    } else if age_days <= 3 * 365 {
        0.9
    } else if age_days <= 7 * 365 {
        0.7
    } else {
        0.5
    }
}

fn category_weight(category: FindingCategory) -> f64 {
    match category {
        FindingCategory::Criminal => 1.5,
        FindingCategory::Regulatory => 1.3,
        FindingCategory::Verification => 1.2,
        FindingCategory::Financial => 1.0,
        FindingCategory::Behavioral => 1.0,
        FindingCategory::Network => 0.9,
        FindingCategory::Reputation => 0.8,
    }
}

pub struct RiskScorer;

impl RiskScorer {
    pub fn score(findings: &[Finding], now: DateTime<Utc>) -> RiskScore {
        let mut per_category: HashMap<FindingCategory, f64> = HashMap::new();
        let mut contributing_factors = Vec::new();

        for finding in findings {
            let base = severity_base(finding.severity);
            let recency = recency_factor(finding.finding_date, now);
            let corrob = if finding.corroborated { 1.2 } else { 1.0 };
            let contrib = base * recency * finding.confidence * corrob * finding.relevance_to_role;

            *per_category.entry(finding.category).or_insert(0.0) += contrib;
            contributing_factors.push(ContributingFactor {
                finding_id: finding.id.clone(),
                category: finding.category,
                contribution: contrib,
            });
        }

        for score in per_category.values_mut() {
            *score = score.min(100.0);
        }

        let (weighted_sum, weight_sum) = per_category
            .iter()
            .fold((0.0, 0.0), |(ws, wsum), (category, score)| {
                let weight = category_weight(*category);
                (ws + weight * score, wsum + weight)
            });

        let overall = if weight_sum > 0.0 { weighted_sum / weight_sum } else { 0.0 };
        let level = Self::level_for(overall);

        let any_critical_finding = findings.iter().any(|f| f.severity == Severity::Critical);
        let recommendation = Self::recommend(level, any_critical_finding);

        RiskScore {
            overall,
            level,
            per_category: per_category.into_iter().map(|(c, s)| (c.as_str().to_string(), s)).collect(),
            contributing_factors,
            recommendation,
        }
    }

    fn level_for(overall: f64) -> RiskLevel {
        if overall <= 25.0 {
            RiskLevel::Low
        } else if overall <= 50.0 {
            RiskLevel::Moderate
        } else if overall <= 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    fn recommend(level: RiskLevel, any_critical_finding: bool) -> Recommendation {
        if any_critical_finding || level == RiskLevel::Critical {
            Recommendation::DoNotProceed
        } else if level == RiskLevel::High {
            Recommendation::ReviewRequired
        } else if level == RiskLevel::Moderate {
            Recommendation::ProceedWithCaution
        } else {
            Recommendation::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screening_core::SubjectId;

    fn finding(severity: Severity, category: FindingCategory, confidence: f64, corroborated: bool, finding_date: Option<DateTime<Utc>>) -> Finding {
        Finding {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: SubjectId::new(),
            category,
            severity,
            confidence,
            relevance_to_role: 1.0,
            summary: "s".into(),
            detail: "d".into(),
            sources: vec!["p1".into()],
            corroborated,
            finding_date,
            usable_for_adverse_action: true,
        }
    }

    #[test]
    fn recency_is_one_at_zero_age_and_half_past_seven_years() {
        let now = Utc::now();
        assert_eq!(recency_factor(Some(now), now), 1.0);
        assert_eq!(recency_factor(Some(now - chrono::Duration::days(8 * 365)), now), 0.5);
    }

    #[test]
    fn is_pure_and_deterministic() {
        let now = Utc::now();
        let findings = vec![finding(Severity::High, FindingCategory::Criminal, 0.9, true, Some(now))];
        let a = RiskScorer::score(&findings, now);
        let b = RiskScorer::score(&findings, now);
        assert_eq!(a.overall, b.overall);
        assert_eq!(a.level, b.level);
    }

    #[test]
    fn any_critical_finding_forces_do_not_proceed() {
        let now = Utc::now();
        let findings = vec![finding(Severity::Critical, FindingCategory::Regulatory, 0.5, false, Some(now))];
        let score = RiskScorer::score(&findings, now);
        assert_eq!(score.recommendation, Recommendation::DoNotProceed);
    }

    #[test]
    fn no_findings_yields_low_and_proceed() {
        let score = RiskScorer::score(&[], Utc::now());
        assert_eq!(score.level, RiskLevel::Low);
        assert_eq!(score.recommendation, Recommendation::Proceed);
    }
}
