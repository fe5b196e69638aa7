//! Iteration controller (spec §4.9): decides continue/stop per iteration.

use crate::{assessor::Assessment, sar_state::SarState};

#[derive(Debug, Clone, Copy)]
pub struct ControllerThresholds {
    pub confidence_target: f64,
    pub max_iterations: u32,
    pub min_info_gain_rate: f64,
}

impl Default for ControllerThresholds {
    fn default() -> Self {
        Self {
            confidence_target: 0.85,
            max_iterations: 4,
            min_info_gain_rate: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop(SarState),
}

pub struct IterationController {
    pub thresholds: ControllerThresholds,
}

impl IterationController {
    pub fn new(thresholds: ControllerThresholds) -> Self {
        Self { thresholds }
    }

    /// `any_iteration_produced_facts` covers the history prior to (and
    /// including) this iteration, used to pick `COMPLETE` vs
    /// `FAILED(no_data_found)` on stop.
    pub fn decide(&self, iteration: u32, assessment: &Assessment, any_iteration_produced_facts: bool) -> Decision {
        let gain_rate = if assessment.total_queries == 0 {
            0.0
        } else {
            assessment.new_facts.len() as f64 / assessment.total_queries as f64
        };

        let stop = assessment.confidence_score >= self.thresholds.confidence_target
            || iteration >= self.thresholds.max_iterations
            || (iteration >= 2 && gain_rate < self.thresholds.min_info_gain_rate)
            || (iteration >= 2 && assessment.gaps.is_empty());

        if !stop {
            return Decision::Continue;
        }

        if any_iteration_produced_facts || !assessment.new_facts.is_empty() {
            Decision::Stop(SarState::Complete)
        } else {
            Decision::Stop(SarState::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Fact;
    use screening_core::InformationType;
    use serde_json::json;

    fn assessment(new_facts: usize, total_queries: u32, confidence: f64, gaps: Vec<String>) -> Assessment {
        Assessment {
            info_type: InformationType::Employment,
            new_facts: (0..new_facts)
                .map(|i| Fact::new("x", json!(i.to_string()), "p", 0.5))
                .collect(),
            cumulative_fact_count: new_facts as u32,
            confidence_score: confidence,
            gaps,
            inconsistencies: Vec::new(),
            entities: Vec::new(),
            successful_queries: total_queries,
            total_queries,
        }
    }

    #[test]
    fn stops_at_max_iterations() {
        let controller = IterationController::new(ControllerThresholds::default());
        let decision = controller.decide(4, &assessment(1, 10, 0.2, vec!["g".into()]), true);
        assert_eq!(decision, Decision::Stop(SarState::Complete));
    }

    #[test]
    fn gain_check_only_applies_from_iteration_two() {
        let controller = IterationController::new(ControllerThresholds::default());
        // Iteration 1 with a low gain rate must not stop on gain alone.
        let decision = controller.decide(1, &assessment(1, 10, 0.2, vec!["g".into()]), false);
        assert_eq!(decision, Decision::Continue);
    }

    #[test]
    fn low_gain_rate_stops_from_iteration_two() {
        let controller = IterationController::new(ControllerThresholds::default());
        let decision = controller.decide(2, &assessment(1, 10, 0.2, vec!["g".into()]), true);
        assert_eq!(decision, Decision::Stop(SarState::Complete));
    }

    #[test]
    fn no_facts_ever_yields_failed() {
        let controller = IterationController::new(ControllerThresholds::default());
        let decision = controller.decide(4, &assessment(0, 10, 0.0, vec![]), false);
        assert_eq!(decision, Decision::Stop(SarState::Failed));
    }
}
