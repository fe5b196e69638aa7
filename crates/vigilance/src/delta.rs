//! Delta detector (spec §4.14): compares two `ProfileVersion`s' findings and
//! classifies what changed between them.

use screening_core::utils::canonicalize;
use screening_engine::{Finding, FindingCategory, ProfileVersion, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaKind {
    New,
    Escalated,
    Resolved,
    StatusChanged,
    Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub kind: DeltaKind,
    pub finding_id: String,
    pub category: FindingCategory,
    pub summary: String,
    pub severity: Severity,
}

/// What changed between a baseline and a current `ProfileVersion` (spec §3
/// `Delta`, §4.14). Empty iff the two versions' findings and connections
/// are identical (testable property 9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    pub new_findings: Vec<DeltaEntry>,
    pub escalated_findings: Vec<DeltaEntry>,
    pub resolved_findings: Vec<DeltaEntry>,
    pub status_changes: Vec<DeltaEntry>,
    pub network_changes: Vec<DeltaEntry>,
    pub max_severity: Option<Severity>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_findings.is_empty()
            && self.escalated_findings.is_empty()
            && self.resolved_findings.is_empty()
            && self.status_changes.is_empty()
            && self.network_changes.is_empty()
    }
}

/// `(category, canonicalized summary)` identifies the "same" finding across
/// versions, mirroring the knowledge base's own fact-identity rule
/// (`screening_core::canonicalize`, spec §4.6).
type FindingKey = (FindingCategory, String);

fn key_for(finding: &Finding) -> FindingKey {
    (finding.category, canonicalize(&finding.summary))
}

/// `(corroborated, usable_for_adverse_action)` stands in for the "status
/// field" spec §4.14 says `STATUS_CHANGED` compares: the finding schema
/// (spec §3) has no separate lifecycle-status enum, so a flip in either of
/// these booleans at the same severity is what "status changed" means here.
fn status_of(finding: &Finding) -> (bool, bool) {
    (finding.corroborated, finding.usable_for_adverse_action)
}

pub struct DeltaDetector;

impl DeltaDetector {
    pub fn compute(baseline: &ProfileVersion, current: &ProfileVersion) -> Delta {
        let baseline_by_key: HashMap<FindingKey, &Finding> =
            baseline.findings.iter().map(|f| (key_for(f), f)).collect();
        let current_by_key: HashMap<FindingKey, &Finding> =
            current.findings.iter().map(|f| (key_for(f), f)).collect();

        let mut delta = Delta::default();

        for (key, finding) in &current_by_key {
            match baseline_by_key.get(key) {
                None => delta.new_findings.push(entry(DeltaKind::New, finding)),
                Some(baseline_finding) => {
                    if finding.severity > baseline_finding.severity {
                        delta.escalated_findings.push(entry(DeltaKind::Escalated, finding));
                    } else if status_of(finding) != status_of(baseline_finding) {
                        delta.status_changes.push(entry(DeltaKind::StatusChanged, finding));
                    }
                }
            }
        }

        for (key, finding) in &baseline_by_key {
            if !current_by_key.contains_key(key) {
                delta.resolved_findings.push(entry(DeltaKind::Resolved, finding));
            }
        }

        delta.network_changes = Self::network_changes(baseline, current);

        delta.max_severity = delta
            .new_findings
            .iter()
            .chain(&delta.escalated_findings)
            .chain(&delta.network_changes)
            .map(|e| e.severity)
            .max();

        delta
    }

    /// A D2/D3 high-risk connection absent from the baseline (spec §4.14
    /// `NETWORK`). "High-risk" is standing in for confidence >= 0.6 since
    /// `EntityRelation` carries no explicit risk tier of its own.
    fn network_changes(baseline: &ProfileVersion, current: &ProfileVersion) -> Vec<DeltaEntry> {
        const HIGH_RISK_CONFIDENCE: f64 = 0.6;

        let baseline_edges: std::collections::HashSet<(String, String)> = baseline
            .connections
            .iter()
            .map(|c| (c.from.clone(), c.to.clone()))
            .collect();

        current
            .connections
            .iter()
            .filter(|c| c.confidence >= HIGH_RISK_CONFIDENCE)
            .filter(|c| !baseline_edges.contains(&(c.from.clone(), c.to.clone())))
            .map(|c| DeltaEntry {
                kind: DeltaKind::Network,
                finding_id: format!("{}->{}", c.from, c.to),
                category: FindingCategory::Network,
                summary: format!("new connection to {}", c.to),
                severity: if c.confidence >= 0.85 { Severity::High } else { Severity::Medium },
            })
            .collect()
    }
}

fn entry(kind: DeltaKind, finding: &Finding) -> DeltaEntry {
    DeltaEntry {
        kind,
        finding_id: finding.id.clone(),
        category: finding.category,
        summary: finding.summary.clone(),
        severity: finding.severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use screening_core::{ScreeningId, SubjectId, TenantId};
    use screening_engine::{RiskLevel, RiskScore, Recommendation, ScreeningStatus, ScreeningTrigger};
    use std::collections::HashMap;

    fn finding(category: FindingCategory, severity: Severity, summary: &str) -> Finding {
        Finding {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: SubjectId::new(),
            category,
            severity,
            confidence: 0.9,
            relevance_to_role: 1.0,
            summary: summary.to_string(),
            detail: "detail".to_string(),
            sources: vec!["p1".to_string()],
            corroborated: true,
            finding_date: Some(Utc::now()),
            usable_for_adverse_action: true,
        }
    }

    fn version(version: u32, findings: Vec<Finding>) -> ProfileVersion {
        ProfileVersion {
            screening_id: ScreeningId::new(),
            subject_id: SubjectId::new(),
            tenant_id: TenantId::new(),
            version,
            trigger: ScreeningTrigger::Monitoring,
            status: ScreeningStatus::Completed,
            findings,
            risk_score: RiskScore {
                overall: 0.0,
                level: RiskLevel::Low,
                per_category: HashMap::new(),
                contributing_factors: Vec::new(),
                recommendation: Recommendation::Proceed,
            },
            connections: Vec::new(),
            data_sources_used: Vec::new(),
            stale_data_used: Vec::new(),
            previous_version: Some(version - 1),
            sar_states: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn identical_versions_yield_empty_delta() {
        let findings = vec![finding(FindingCategory::Criminal, Severity::High, "felony on record")];
        let baseline = version(3, findings.clone());
        let current = version(4, findings);

        let delta = DeltaDetector::compute(&baseline, &current);
        assert!(delta.is_empty());
        assert!(delta.max_severity.is_none());
    }

    #[test]
    fn new_sanctions_finding_is_classified_new_with_max_severity() {
        let baseline = version(3, vec![]);
        let current = version(
            4,
            vec![finding(FindingCategory::Regulatory, Severity::High, "sanctions list match")],
        );

        let delta = DeltaDetector::compute(&baseline, &current);
        assert_eq!(delta.new_findings.len(), 1);
        assert_eq!(delta.max_severity, Some(Severity::High));
    }

    #[test]
    fn severity_increase_on_same_finding_is_escalated() {
        let baseline = version(3, vec![finding(FindingCategory::Criminal, Severity::Medium, "record found")]);
        let current = version(4, vec![finding(FindingCategory::Criminal, Severity::High, "record found")]);

        let delta = DeltaDetector::compute(&baseline, &current);
        assert_eq!(delta.escalated_findings.len(), 1);
        assert!(delta.new_findings.is_empty());
    }

    #[test]
    fn finding_absent_from_current_is_resolved() {
        let baseline = version(3, vec![finding(FindingCategory::Financial, Severity::Medium, "lien on record")]);
        let current = version(4, vec![]);

        let delta = DeltaDetector::compute(&baseline, &current);
        assert_eq!(delta.resolved_findings.len(), 1);
    }
}
