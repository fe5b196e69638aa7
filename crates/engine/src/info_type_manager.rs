//! Information-type manager (spec §4.10): orders types by phase
//! dependency, filters by tier, locale, role and the compliance oracle.

use crate::{compliance::ComplianceOracle, sar_state::SarState, subject::ServiceTier};
use screening_core::{InfoTypePhase, InformationType};
use std::collections::HashMap;

pub struct InformationTypeManager<'a> {
    pub oracle: &'a dyn ComplianceOracle,
    pub locale: String,
    pub role: String,
    pub tier: ServiceTier,
}

impl<'a> InformationTypeManager<'a> {
    pub fn new(oracle: &'a dyn ComplianceOracle, locale: impl Into<String>, role: impl Into<String>, tier: ServiceTier) -> Self {
        Self {
            oracle,
            locale: locale.into(),
            role: role.into(),
            tier,
        }
    }

    /// Whether an info type is permitted at all for this screening's
    /// `(locale, role, tier)`, independent of phase ordering.
    pub async fn is_permitted(&self, info_type: InformationType) -> bool {
        if info_type == InformationType::DigitalFootprint && self.tier == ServiceTier::Standard {
            return false;
        }
        self.oracle.permit(info_type, &self.locale, &self.role, self.tier).await
    }

    /// The next batch of info types ready to run, given the terminal
    /// states already observed. Types whose phase has an un-terminal
    /// permitted predecessor are withheld; within a ready phase, all
    /// not-yet-started permitted types are yielded together so the
    /// orchestrator can run them concurrently.
    pub async fn next_batch(&self, states: &HashMap<InformationType, SarState>) -> Vec<InformationType> {
        let mut permitted = HashMap::new();
        for info_type in InformationType::ALL {
            permitted.insert(info_type, self.is_permitted(info_type).await);
        }

        let phase_ready = |phase: InfoTypePhase| -> bool {
            InformationType::ALL
                .into_iter()
                .filter(|t| t.phase() < phase && permitted[t])
                .all(|t| states.get(&t).copied().unwrap_or(SarState::Pending).is_terminal())
        };

        InformationType::ALL
            .into_iter()
            .filter(|t| permitted[t])
            .filter(|t| matches!(states.get(t).copied().unwrap_or(SarState::Pending), SarState::Pending))
            .filter(|t| phase_ready(t.phase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::AllowAllCompliance;

    #[tokio::test]
    async fn records_withheld_until_foundation_terminal() {
        let oracle = AllowAllCompliance;
        let manager = InformationTypeManager::new(&oracle, "US", "recruiter", ServiceTier::Enhanced);

        let states = HashMap::new();
        let batch = manager.next_batch(&states).await;
        assert!(batch.iter().all(|t| t.phase() == InfoTypePhase::Foundation));
    }

    #[tokio::test]
    async fn records_released_once_foundation_is_terminal() {
        let oracle = AllowAllCompliance;
        let manager = InformationTypeManager::new(&oracle, "US", "recruiter", ServiceTier::Enhanced);

        let mut states = HashMap::new();
        for t in [InformationType::Identity, InformationType::Employment, InformationType::Education] {
            states.insert(t, SarState::Complete);
        }

        let batch = manager.next_batch(&states).await;
        assert!(!batch.is_empty());
        assert!(batch.iter().all(|t| t.phase() == InfoTypePhase::Records));
    }

    #[tokio::test]
    async fn digital_footprint_excluded_for_standard_tier() {
        let oracle = AllowAllCompliance;
        let manager = InformationTypeManager::new(&oracle, "US", "recruiter", ServiceTier::Standard);
        assert!(!manager.is_permitted(InformationType::DigitalFootprint).await);
    }
}
