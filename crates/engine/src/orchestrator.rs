//! SAR loop orchestrator (spec §4.11): drives plan -> execute -> assess ->
//! decide for one information type across iterations, and drives the
//! phase-ordered batch of types across a whole screening.
//!
//! The planner emits one `SearchQuery` per candidate provider so its output
//! reads like a dispatch plan, but the gateway's `QueryExecutor` already owns
//! provider selection, fallback substitution and caching for a check type
//! (`screening_gateway::executor::QueryExecutor::execute`). Rather than
//! duplicate that fallback logic here, the orchestrator collapses the
//! planner's output to one gateway `QueryRequest` per distinct parameter set
//! and lets the executor pick (and retry across) providers on its own; the
//! planner's per-candidate `provider_id` only survives as a dedup/audit tag.

use crate::{
    assessor::{Assessment, Inconsistency, ResultAssessor},
    controller::{Decision, IterationController},
    info_type_manager::InformationTypeManager,
    knowledge_base::KnowledgeBase,
    planner::QueryPlanner,
    query::{QueryResult, QueryStatus, SearchQuery},
    sar_state::{IterationRecord, SarState, SarTypeState},
    subject::{ServiceTier, Subject},
};
use chrono::{DateTime, Utc};
use screening_core::{InformationType, TenantId};
use screening_gateway::QueryExecutor;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

/// What one information type's SAR loop produced, beyond its terminal state:
/// the inconsistencies its last iteration found, and the provenance a
/// `ProfileVersion` must publish (spec §3 `data_sources_used`, `stale_data_used`).
#[derive(Debug, Default)]
pub struct TypeRunOutcome {
    pub state: SarTypeState,
    pub inconsistencies: Vec<Inconsistency>,
    pub data_sources_used: HashSet<String>,
    pub stale_data_used: HashSet<String>,
    pub cancelled: bool,
}

/// Cooperative deadline check (spec §5 "every operation carries a deadline
/// inherited from the enclosing screening deadline"). Checked at each
/// suspension-point boundary — before planning an iteration's queries and
/// before releasing a new phase batch — rather than by preempting in-flight
/// futures.
fn deadline_passed(deadline: Option<DateTime<Utc>>) -> bool {
    deadline.is_some_and(|d| Utc::now() >= d)
}

fn gateway_tier(tier: ServiceTier) -> screening_gateway::cache::ServiceTier {
    match tier {
        ServiceTier::Standard => screening_gateway::cache::ServiceTier::Standard,
        ServiceTier::Enhanced => screening_gateway::cache::ServiceTier::Enhanced,
    }
}

/// Runs the distinct parameter sets named by `queries` through the gateway,
/// one `QueryRequest` per distinct `params` value.
async fn dispatch(
    queries: &[SearchQuery],
    executor: &QueryExecutor,
    subject: &Subject,
    tenant_id: TenantId,
    tier: ServiceTier,
) -> Vec<QueryResult> {
    let mut by_params: HashMap<String, &SearchQuery> = HashMap::new();
    for query in queries {
        by_params
            .entry(serde_json::to_string(&query.params).unwrap_or_default())
            .or_insert(query);
    }

    let mut results = Vec::with_capacity(by_params.len());
    for representative in by_params.values() {
        let request = screening_gateway::QueryRequest {
            subject_id: subject.id,
            check_type: representative.info_type,
            tenant_id: Some(tenant_id),
            tier: gateway_tier(tier),
            params: representative.params.clone(),
        };

        let started = Instant::now();
        let result = match executor.execute(&request).await {
            Ok(outcome) => QueryResult {
                query_id: representative.query_id.clone(),
                provider_id: outcome.provider_id,
                status: QueryStatus::Success,
                raw: Some(outcome.records),
                latency_ms: started.elapsed().as_millis() as u64,
                retry_count: 0,
                error: None,
                stale: outcome.stale,
            },
            Err(err) => QueryResult {
                query_id: representative.query_id.clone(),
                provider_id: representative.provider_id.clone(),
                status: QueryStatus::Failed,
                raw: None,
                latency_ms: started.elapsed().as_millis() as u64,
                retry_count: 0,
                error: Some(err.to_string()),
                stale: false,
            },
        };
        results.push(result);
    }

    results
}

pub struct ScreeningOrchestrator {
    planner: QueryPlanner,
    executor: Arc<QueryExecutor>,
    controller: IterationController,
}

impl ScreeningOrchestrator {
    pub fn new(planner: QueryPlanner, executor: Arc<QueryExecutor>, controller: IterationController) -> Self {
        Self { planner, executor, controller }
    }

    /// Drives one information type's SAR loop to a terminal state.
    async fn run_type(
        &self,
        info_type: InformationType,
        subject: &Subject,
        tenant_id: TenantId,
        tier: ServiceTier,
        kb: &KnowledgeBase,
        completed_types: &[InformationType],
        deadline: Option<DateTime<Utc>>,
    ) -> TypeRunOutcome {
        let mut state = SarTypeState::default();
        let mut gaps: Vec<String> = Vec::new();
        let mut any_facts_ever = false;
        let mut outcome = TypeRunOutcome::default();

        loop {
            if deadline_passed(deadline) {
                state.state = SarState::Failed;
                state.terminal_reason = Some("cancelled".to_string());
                outcome.state = state;
                outcome.cancelled = true;
                return outcome;
            }

            let iteration = state.iteration + 1;

            let queries = if iteration == 1 {
                let snapshot = kb.snapshot().await;
                self.planner.plan_initial(info_type, subject, &snapshot, completed_types)
            } else {
                self.planner.plan_gap_fill(info_type, &gaps, iteration)
            };

            if queries.is_empty() {
                state.skip("no_provider_available");
                outcome.state = state;
                return outcome;
            }

            let results = dispatch(&queries, &self.executor, subject, tenant_id, tier).await;
            for result in &results {
                if result.status == QueryStatus::Success {
                    outcome.data_sources_used.insert(result.provider_id.clone());
                    if result.stale {
                        outcome.stale_data_used.insert(result.provider_id.clone());
                    }
                }
            }
            let assessment = ResultAssessor::assess(info_type, &results, kb).await;

            any_facts_ever = any_facts_ever || !assessment.new_facts.is_empty();
            let decision = self.controller.decide(iteration, &assessment, any_facts_ever);

            state.iteration = iteration;
            state.history.push(Self::record(iteration, &queries, &results, &assessment));
            gaps = assessment.gaps.clone();
            outcome.inconsistencies = assessment.inconsistencies.clone();

            if let Decision::Stop(terminal) = decision {
                state.state = terminal;
                state.terminal_reason = Some(match terminal {
                    SarState::Complete => "stop_condition_met".to_string(),
                    SarState::Failed => "no_data_found".to_string(),
                    _ => "terminated".to_string(),
                });
                outcome.state = state;
                return outcome;
            }
        }
    }

    fn record(iteration: u32, queries: &[SearchQuery], results: &[QueryResult], assessment: &Assessment) -> IterationRecord {
        let successful = results.iter().filter(|r| r.status == QueryStatus::Success).count() as u32;
        IterationRecord {
            iteration,
            queries_generated: queries.len() as u32,
            queries_executed: results.len() as u32,
            successful_queries: successful,
            new_facts: assessment.new_facts.len() as u32,
            cumulative_facts: assessment.cumulative_fact_count,
            confidence_score: assessment.confidence_score,
            gaps: assessment.gaps.clone(),
            info_gain_rate: IterationRecord::gain_rate(assessment.new_facts.len() as u32, results.len() as u32),
        }
    }

    /// Drives the full phase-ordered set of information types: each ready
    /// batch runs concurrently, and the next batch is only released once
    /// `InformationTypeManager` reports its phase predecessors terminal.
    pub async fn run(
        &self,
        subject: &Subject,
        tenant_id: TenantId,
        tier: ServiceTier,
        manager: &InformationTypeManager<'_>,
        kb: &KnowledgeBase,
        deadline: Option<DateTime<Utc>>,
    ) -> ScreeningRunResult {
        let mut states: HashMap<InformationType, SarTypeState> = HashMap::new();
        let mut inconsistencies: HashMap<InformationType, Vec<Inconsistency>> = HashMap::new();
        let mut data_sources_used: HashSet<String> = HashSet::new();
        let mut stale_data_used: HashSet<String> = HashSet::new();
        let mut cancelled = false;

        loop {
            if deadline_passed(deadline) {
                cancelled = true;
                break;
            }

            let observed: HashMap<InformationType, SarState> =
                states.iter().map(|(t, s)| (*t, s.state)).collect();
            let batch = manager.next_batch(&observed).await;
            if batch.is_empty() {
                break;
            }

            let completed_types: Vec<InformationType> = states
                .iter()
                .filter(|(_, s)| s.state == SarState::Complete)
                .map(|(t, _)| *t)
                .collect();

            let futures = batch.iter().map(|&info_type| {
                self.run_type(info_type, subject, tenant_id, tier, kb, &completed_types, deadline)
            });
            let results = futures::future::join_all(futures).await;

            for (info_type, outcome) in batch.into_iter().zip(results) {
                cancelled = cancelled || outcome.cancelled;
                states.insert(info_type, outcome.state);
                inconsistencies.insert(info_type, outcome.inconsistencies);
                data_sources_used.extend(outcome.data_sources_used);
                stale_data_used.extend(outcome.stale_data_used);
            }

            if cancelled {
                break;
            }
        }

        for info_type in InformationType::ALL {
            states.entry(info_type).or_insert_with(|| {
                let mut s = SarTypeState::default();
                s.skip("not_permitted");
                s
            });
        }

        ScreeningRunResult { states, inconsistencies, data_sources_used, stale_data_used, cancelled }
    }
}

/// The full batch run's result: terminal states per information type, the
/// inconsistencies that fed the finding extractor, and the provenance a
/// `ProfileVersion` publishes (spec §3 `data_sources_used`, `stale_data_used`).
#[derive(Debug, Default)]
pub struct ScreeningRunResult {
    pub states: HashMap<InformationType, SarTypeState>,
    pub inconsistencies: HashMap<InformationType, Vec<Inconsistency>>,
    pub data_sources_used: HashSet<String>,
    pub stale_data_used: HashSet<String>,
    pub cancelled: bool,
}
