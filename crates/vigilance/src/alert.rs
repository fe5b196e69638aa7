//! Alert generator (spec §4.14): emits an alert iff a delta's max severity
//! meets the subject's vigilance-level threshold.

use crate::delta::Delta;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use screening_core::{AlertId, Result, SubjectId, TenantId};
use screening_engine::{Severity, VigilanceLevel};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An alert a vigilance check raised, carrying the delta that triggered it
/// and enough identity to route it (spec §4.14: "Alerts carry the delta,
/// the triggering subject and tenant, and a stable alert id").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub subject_id: SubjectId,
    pub tenant_id: TenantId,
    pub vigilance_level: VigilanceLevel,
    pub baseline_version: u32,
    pub current_version: u32,
    pub delta: Delta,
    pub max_severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// Per-level severity floor an alert must clear (spec §4.14: "V1 -> CRITICAL,
/// V2 -> HIGH, V3 -> MEDIUM"). `V0` never monitors, so it has no threshold.
fn threshold(level: VigilanceLevel) -> Option<Severity> {
    match level {
        VigilanceLevel::V0 => None,
        VigilanceLevel::V1 => Some(Severity::Critical),
        VigilanceLevel::V2 => Some(Severity::High),
        VigilanceLevel::V3 => Some(Severity::Medium),
    }
}

/// Builds an `Alert` from a delta iff its max severity clears the vigilance
/// level's threshold; otherwise the check produced no alert (spec §8
/// testable property 9: an empty or below-threshold delta alerts nobody).
pub fn generate(
    subject_id: SubjectId,
    tenant_id: TenantId,
    vigilance_level: VigilanceLevel,
    baseline_version: u32,
    current_version: u32,
    delta: Delta,
) -> Option<Alert> {
    let max_severity = delta.max_severity?;
    let required = threshold(vigilance_level)?;
    if max_severity < required {
        return None;
    }

    Some(Alert {
        id: AlertId::new(),
        subject_id,
        tenant_id,
        vigilance_level,
        baseline_version,
        current_version,
        delta,
        max_severity,
        created_at: Utc::now(),
    })
}

/// Delivery channels (paging, email, webhook fan-out) are an external
/// collaborator; this trait is the only surface the scheduler calls.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, alert: Alert) -> Result<()>;
}

/// In-process fan-out over a `tokio::sync::broadcast` channel. Lagging
/// subscribers drop old alerts rather than block the scheduler; a
/// production deployment also persists alerts (see `ProfileStore`'s
/// Postgres note) so a dropped broadcast isn't the only record of one.
pub struct BroadcastAlertSink {
    sender: broadcast::Sender<Alert>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AlertSink for BroadcastAlertSink {
    async fn publish(&self, alert: Alert) -> Result<()> {
        // No active subscribers is not an error: an alert fired before any
        // listener attached still advanced the baseline correctly.
        let _ = self.sender.send(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaEntry, DeltaKind};
    use screening_engine::FindingCategory;

    fn delta_with_max(severity: Severity) -> Delta {
        Delta {
            new_findings: vec![DeltaEntry {
                kind: DeltaKind::New,
                finding_id: "f1".to_string(),
                category: FindingCategory::Criminal,
                summary: "s".to_string(),
                severity,
            }],
            max_severity: Some(severity),
            ..Default::default()
        }
    }

    #[test]
    fn v2_high_severity_clears_threshold() {
        let alert = generate(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V2,
            3,
            4,
            delta_with_max(Severity::High),
        );
        assert!(alert.is_some());
    }

    #[test]
    fn v2_medium_severity_does_not_clear_threshold() {
        let alert = generate(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V2,
            3,
            4,
            delta_with_max(Severity::Medium),
        );
        assert!(alert.is_none());
    }

    #[test]
    fn empty_delta_never_alerts() {
        let alert = generate(SubjectId::new(), TenantId::new(), VigilanceLevel::V1, 3, 4, Delta::default());
        assert!(alert.is_none());
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscriber() {
        let sink = BroadcastAlertSink::new(16);
        let mut rx = sink.subscribe();

        let alert = generate(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V1,
            1,
            2,
            delta_with_max(Severity::Critical),
        )
        .unwrap();
        sink.publish(alert.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id.0, alert.id.0);
    }
}
