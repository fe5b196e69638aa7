//! Screening aggregate (spec §3, §6, §7): pre-flight checks, idempotent
//! `start_screening`, and the `ProfileVersion` a completed run produces.

use crate::{
    compliance::{ComplianceOracle, ConsentStore, ScopedOracle},
    entity::EntityRelation,
    finding::{ClassifierContext, Finding, FindingExtractor},
    info_type_manager::InformationTypeManager,
    knowledge_base::KnowledgeBase,
    orchestrator::ScreeningOrchestrator,
    risk::{RiskScore, RiskScorer},
    sar_state::{SarState, SarTypeState},
    subject::{vigilance_scope, ScreeningRequest},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use screening_core::{
    audit::{AuditEvent, AuditLogger, EventOutcome, EventSeverity, EventType},
    Error, ErrorCode, InfoTypePhase, InformationType, Result, ScreeningId, SubjectId, TenantId,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningStatus {
    Completed,
    InsufficientData,
}

/// What produced a `ProfileVersion` (spec §3). `Screening` is a requester-
/// initiated run; `Monitoring` is a vigilance-scheduler re-screen; `Manual`
/// is an operator-triggered re-screen outside either cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningTrigger {
    Screening,
    Monitoring,
    Manual,
}

/// A completed screening's published result (spec §3 `ProfileVersion`).
/// Vigilance re-screens produce successive versions of the same subject's
/// profile, which is what makes delta detection possible downstream.
///
/// Deviation: spec §3 lists an optional `delta` field on `ProfileVersion`
/// itself. The delta detector lives in the vigilance crate, one layer above
/// this engine, so it attaches the computed `Delta` to its own `Alert`
/// record instead of mutating an already-published, append-only version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileVersion {
    pub screening_id: ScreeningId,
    pub subject_id: SubjectId,
    pub tenant_id: TenantId,
    pub version: u32,
    pub trigger: ScreeningTrigger,
    pub status: ScreeningStatus,
    pub findings: Vec<Finding>,
    pub risk_score: RiskScore,
    pub connections: Vec<EntityRelation>,
    pub data_sources_used: Vec<String>,
    pub stale_data_used: Vec<String>,
    pub previous_version: Option<u32>,
    /// Keyed by `InformationType::as_str()` — `serde_json` map keys must
    /// serialize as strings.
    pub sar_states: HashMap<String, SarTypeState>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn latest_version(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Option<ProfileVersion>>;
    async fn save(&self, profile: ProfileVersion) -> Result<()>;
    /// Looks a single published version up by its `screening_id`, for the
    /// `GET /screenings/:id` surface, which only has the id a
    /// `start_screening` caller was handed back, not the subject it belongs
    /// to.
    async fn find_by_screening_id(
        &self,
        screening_id: ScreeningId,
        tenant_id: TenantId,
    ) -> Result<Option<ProfileVersion>>;
}

/// Local, non-durable `ProfileStore` for tests and single-node operation.
/// A production deployment backs this with Postgres, in the manner of
/// `screening_gateway::cache::store::CacheStore`'s `PostgresCacheStore`.
#[derive(Default)]
pub struct InMemoryProfileStore {
    versions: DashMap<(SubjectId, TenantId), Vec<ProfileVersion>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn latest_version(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Option<ProfileVersion>> {
        Ok(self
            .versions
            .get(&(subject_id, tenant_id))
            .and_then(|v| v.last().cloned()))
    }

    async fn save(&self, profile: ProfileVersion) -> Result<()> {
        self.versions
            .entry((profile.subject_id, profile.tenant_id))
            .or_default()
            .push(profile);
        Ok(())
    }

    async fn find_by_screening_id(
        &self,
        screening_id: ScreeningId,
        tenant_id: TenantId,
    ) -> Result<Option<ProfileVersion>> {
        Ok(self
            .versions
            .iter()
            .filter(|e| e.key().1 == tenant_id)
            .find_map(|e| e.value().iter().find(|p| p.screening_id == screening_id).cloned()))
    }
}

/// What an idempotency slot holds while its screening is still running, and
/// what it holds once `start_screening` has a result to replay (spec §8
/// testable property 7: a replayed `(tenant_id, correlation_id)` returns the
/// original result and dispatches no new provider calls).
#[derive(Clone)]
enum IdempotencySlot {
    InProgress(ScreeningId),
    Completed(Box<ProfileVersion>),
}

/// Builds the `{info_type, terminal_state, reason}` tuples spec §7 requires
/// as the user-visible surface of a failed screening, from the per-type
/// state the orchestrator already tracked.
fn type_state_tuples(states: &HashMap<InformationType, SarTypeState>) -> serde_json::Value {
    serde_json::Value::Array(
        states
            .iter()
            .map(|(info_type, state)| {
                serde_json::json!({
                    "info_type": info_type.as_str(),
                    "terminal_state": state.state,
                    "reason": state.terminal_reason,
                })
            })
            .collect(),
    )
}

/// The screening engine's composition root: a compliance oracle, a consent
/// store, and the SAR orchestrator, wired together per the process in
/// spec §6 `start_screening`.
pub struct ScreeningEngine {
    oracle: Arc<dyn ComplianceOracle>,
    consent: Arc<dyn ConsentStore>,
    orchestrator: Arc<ScreeningOrchestrator>,
    synthesis_providers: Arc<HashSet<String>>,
    synthesis_confidence_cap: f64,
    idempotency: DashMap<(TenantId, String), IdempotencySlot>,
    audit: Option<Arc<AuditLogger>>,
}

impl ScreeningEngine {
    pub fn new(
        oracle: Arc<dyn ComplianceOracle>,
        consent: Arc<dyn ConsentStore>,
        orchestrator: Arc<ScreeningOrchestrator>,
        synthesis_providers: HashSet<String>,
        synthesis_confidence_cap: f64,
    ) -> Self {
        Self {
            oracle,
            consent,
            orchestrator,
            synthesis_providers: Arc::new(synthesis_providers),
            synthesis_confidence_cap,
            idempotency: DashMap::new(),
            audit: None,
        }
    }

    /// Attaches the shared audit sink (spec §6: `AuditSink.emit(event)`).
    /// Without one, lifecycle events are dropped rather than the call
    /// failing — auditing is best-effort, never a gate on screening.
    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn emit(
        &self,
        tenant_id: TenantId,
        event_type: EventType,
        severity: EventSeverity,
        outcome: EventOutcome,
        description: &str,
    ) {
        let Some(audit) = &self.audit else { return };
        let event = AuditEvent::builder(event_type, description.to_string())
            .severity(severity)
            .outcome(outcome)
            .tenant_id(tenant_id.to_string())
            .build();
        if let Err(err) = audit.log_event(event).await {
            warn!(error = %err, "failed to record screening audit event");
        }
    }

    /// Runs preflight checks, drives the SAR loop to completion across all
    /// permitted information types, and returns the resulting profile.
    /// `(tenant_id, correlation_id)` is idempotent: replaying the same
    /// correlation id for a tenant once the original screening has
    /// completed returns that same `ProfileVersion` and dispatches no new
    /// provider calls; replaying it while the original is still in flight
    /// fails fast with `DuplicateCorrelation` instead of running a second
    /// copy concurrently.
    pub async fn start_screening(&self, request: ScreeningRequest) -> Result<ProfileVersion> {
        let idempotency_key = (request.tenant_id, request.correlation_id.clone());
        match self.idempotency.get(&idempotency_key).map(|s| s.clone()) {
            Some(IdempotencySlot::Completed(profile)) => return Ok(*profile),
            Some(IdempotencySlot::InProgress(existing_id)) => {
                return Err(Error::new(
                    ErrorCode::DuplicateCorrelation,
                    format!("screening {existing_id} is already in progress for this correlation id"),
                ));
            }
            None => {}
        }

        request.service_config.validate()?;
        self.emit(
            request.tenant_id,
            EventType::ScreeningRequested,
            EventSeverity::Info,
            EventOutcome::Success,
            &format!("screening requested for subject {}", request.subject.id),
        )
        .await;

        let consent_status = self
            .consent
            .verify(request.subject.id, "screening", request.tenant_id)
            .await?;
        if !consent_status.valid {
            self.emit(
                request.tenant_id,
                EventType::ConsentCheckDenied,
                EventSeverity::Warning,
                EventOutcome::Failure,
                &format!("consent missing for subject {}", request.subject.id),
            )
            .await;
            return Err(Error::consent_missing("subject consent is missing or expired"));
        }
        self.emit(
            request.tenant_id,
            EventType::ConsentGranted,
            EventSeverity::Info,
            EventOutcome::Success,
            &format!("consent verified for subject {}", request.subject.id),
        )
        .await;

        let screening_id = ScreeningId::new();
        self.idempotency
            .insert(idempotency_key.clone(), IdempotencySlot::InProgress(screening_id));

        let result = self.run(&request, screening_id, ScreeningTrigger::Screening, 1, None).await;
        match &result {
            Ok(profile) => {
                self.idempotency
                    .insert(idempotency_key, IdempotencySlot::Completed(Box::new(profile.clone())));
                self.emit(
                    request.tenant_id,
                    EventType::ScreeningCompleted,
                    EventSeverity::Info,
                    EventOutcome::Success,
                    &format!("screening {screening_id} completed as version {}", profile.version),
                )
                .await;
            }
            Err(err) => {
                // Let a retry actually re-attempt rather than wedging the
                // correlation id on a failed run forever.
                self.idempotency.remove(&idempotency_key);
                self.emit(
                    request.tenant_id,
                    EventType::ScreeningFailed,
                    EventSeverity::Warning,
                    EventOutcome::Failure,
                    &format!("screening {screening_id} failed: {err}"),
                )
                .await;
            }
        }
        result
    }

    /// Re-screens a subject on the vigilance scheduler's (or an operator's)
    /// behalf, producing the next version in that subject's append-only
    /// sequence. Bypasses the correlation-id idempotency check: monitoring
    /// runs are scheduler-driven, not requester-submitted.
    pub async fn start_monitoring_run(
        &self,
        request: ScreeningRequest,
        previous: &ProfileVersion,
        trigger: ScreeningTrigger,
    ) -> Result<ProfileVersion> {
        request.service_config.validate()?;
        let consent_status = self
            .consent
            .verify(request.subject.id, "screening", request.tenant_id)
            .await?;
        if !consent_status.valid {
            self.emit(
                request.tenant_id,
                EventType::ConsentCheckDenied,
                EventSeverity::Warning,
                EventOutcome::Failure,
                &format!("consent missing for subject {}", request.subject.id),
            )
            .await;
            return Err(Error::consent_missing("subject consent is missing or expired"));
        }

        let screening_id = ScreeningId::new();
        let result = self
            .run(&request, screening_id, trigger, previous.version + 1, Some(previous.version))
            .await;
        match &result {
            Ok(profile) => {
                self.emit(
                    request.tenant_id,
                    EventType::ScreeningCompleted,
                    EventSeverity::Info,
                    EventOutcome::Success,
                    &format!("monitoring re-screen {screening_id} completed as version {}", profile.version),
                )
                .await;
            }
            Err(err) => {
                self.emit(
                    request.tenant_id,
                    EventType::ScreeningFailed,
                    EventSeverity::Warning,
                    EventOutcome::Failure,
                    &format!("monitoring re-screen {screening_id} failed: {err}"),
                )
                .await;
            }
        }
        result
    }

    async fn run(
        &self,
        request: &ScreeningRequest,
        screening_id: ScreeningId,
        trigger: ScreeningTrigger,
        version: u32,
        previous_version: Option<u32>,
    ) -> Result<ProfileVersion> {
        let kb = KnowledgeBase::new();

        let scope = if trigger == ScreeningTrigger::Monitoring {
            vigilance_scope(request.service_config.vigilance)
        } else {
            None
        };
        let scoped_oracle;
        let oracle_ref: &dyn ComplianceOracle = match &scope {
            Some(allowed) => {
                scoped_oracle = ScopedOracle { inner: self.oracle.as_ref(), allowed };
                &scoped_oracle
            }
            None => self.oracle.as_ref(),
        };

        let manager = InformationTypeManager::new(
            oracle_ref,
            request.locale.clone(),
            request.role.clone(),
            request.service_config.tier,
        );

        let run_result = self
            .orchestrator
            .run(
                &request.subject,
                request.tenant_id,
                request.service_config.tier,
                &manager,
                &kb,
                request.deadline,
            )
            .await;

        if run_result.cancelled {
            self.emit(
                request.tenant_id,
                EventType::ScreeningCancelled,
                EventSeverity::Warning,
                EventOutcome::Failure,
                &format!("screening {screening_id} cancelled: deadline exceeded"),
            )
            .await;
            return Err(Error::cancelled("screening deadline exceeded")
                .add_metadata("type_states", type_state_tuples(&run_result.states)));
        }

        let foundation_satisfied = run_result
            .states
            .iter()
            .any(|(t, s)| t.phase() == InfoTypePhase::Foundation && s.state == SarState::Complete);

        if !foundation_satisfied {
            return Err(Error::insufficient_data("no Foundation information type reached COMPLETE")
                .add_metadata("type_states", type_state_tuples(&run_result.states)));
        }

        let ctx = ClassifierContext {
            synthesis_providers: &self.synthesis_providers,
            synthesis_confidence_cap: self.synthesis_confidence_cap,
        };

        let mut findings = Vec::new();
        for (&info_type, state) in &run_result.states {
            if state.state != SarState::Complete {
                continue;
            }
            let empty = Vec::new();
            let type_inconsistencies = run_result.inconsistencies.get(&info_type).unwrap_or(&empty);
            let extracted = FindingExtractor::extract(
                request.subject.id,
                info_type,
                &kb,
                type_inconsistencies,
                1.0,
                &ctx,
            )
            .await;
            findings.extend(extracted);
        }

        for finding in &mut findings {
            finding.relevance_to_role = self
                .oracle
                .relevance_multiplier(finding.category.as_str(), &request.role)
                .await;
        }

        self.emit(
            request.tenant_id,
            EventType::FindingClassified,
            EventSeverity::Info,
            EventOutcome::Success,
            &format!("{} findings classified for screening {screening_id}", findings.len()),
        )
        .await;

        let risk_score = RiskScorer::score(&findings, Utc::now());
        let snapshot = kb.snapshot().await;
        let connections = Self::connections_from_snapshot(screening_id, &snapshot);

        self.emit(
            request.tenant_id,
            EventType::ResourceCreated,
            EventSeverity::Info,
            EventOutcome::Success,
            &format!("profile version {version} created for subject {}", request.subject.id),
        )
        .await;

        Ok(ProfileVersion {
            screening_id,
            subject_id: request.subject.id,
            tenant_id: request.tenant_id,
            version,
            trigger,
            status: ScreeningStatus::Completed,
            findings,
            risk_score,
            connections,
            data_sources_used: run_result.data_sources_used.into_iter().collect(),
            stale_data_used: run_result.stale_data_used.into_iter().collect(),
            previous_version,
            sar_states: run_result.states.into_iter().map(|(t, s)| (t.as_str().to_string(), s)).collect(),
            created_at: Utc::now(),
        })
    }

    /// Projects the knowledge base's discovered entities into network edges
    /// (spec §3 `ProfileVersion.connections`). Only D2/D3 screenings expand
    /// the network at all, since foundation queries never populate
    /// `discovered_people`/`discovered_orgs`.
    fn connections_from_snapshot(
        screening_id: ScreeningId,
        snapshot: &crate::knowledge_base::KnowledgeSnapshot,
    ) -> Vec<EntityRelation> {
        use crate::entity::RelationType;

        snapshot
            .discovered_orgs
            .iter()
            .map(|e| (e, RelationType::Employer))
            .chain(snapshot.discovered_people.iter().map(|e| (e, RelationType::Associate)))
            .map(|(entity, relation_type)| EntityRelation {
                from: "subject".to_string(),
                to: entity.name.clone(),
                relation_type,
                confidence: 0.7,
                discovered_in: screening_id,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compliance::{AllowAllCompliance, AlwaysConsentedStore},
        controller::{ControllerThresholds, IterationController},
        planner::QueryPlanner,
        subject::{DeclaredIdentifiers, Degree, ServiceConfig, ServiceTier, Subject, SubjectKind, VigilanceLevel},
    };
    use screening_gateway::{
        HealthMonitor, InMemoryCacheStore, NormalizedRecord, NormalizedRecords, Provider, ProviderError,
        ProviderHealth, ProviderRegistry, ProviderTierCategory, QueryExecutor, QueryParams, RateLimiter,
        RawResponse,
    };
    use std::time::Duration;

    struct StubIdentityProvider;

    #[async_trait]
    impl Provider for StubIdentityProvider {
        fn id(&self) -> &str {
            "p_identity"
        }
        fn supported_check_types(&self) -> &[InformationType] {
            &[InformationType::Identity]
        }
        fn tier_category(&self) -> ProviderTierCategory {
            ProviderTierCategory::Authoritative
        }
        fn cost_per_query(&self) -> f64 {
            0.1
        }
        fn rate_limit_per_minute(&self) -> u32 {
            600
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn query(
            &self,
            check_type: InformationType,
            _params: &QueryParams,
        ) -> std::result::Result<RawResponse, ProviderError> {
            Ok(RawResponse {
                provider_id: "p_identity".to_string(),
                check_type,
                payload: serde_json::json!({ "confirmed_name": "Jane Roe" }),
                received_at: Utc::now(),
            })
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            vec![NormalizedRecord {
                record_type: "confirmed_name".to_string(),
                fields: serde_json::json!("Jane Roe"),
                confidence: 0.95,
            }]
        }
        async fn health_check(&self) -> ProviderHealth {
            ProviderHealth { available: true, latency_ms: 5, error_rate: 0.0 }
        }
    }

    fn build_engine() -> ScreeningEngine {
        let registry = ProviderRegistry::new(vec![Arc::new(StubIdentityProvider)]);
        let planner = QueryPlanner::new(registry.clone());
        let cache = Arc::new(InMemoryCacheStore::default());
        let executor = Arc::new(QueryExecutor::new(
            registry,
            RateLimiter::default(),
            HealthMonitor::default(),
            cache,
        ));
        let controller = IterationController::new(ControllerThresholds::default());
        let orchestrator = Arc::new(ScreeningOrchestrator::new(planner, executor, controller));

        ScreeningEngine::new(
            Arc::new(AllowAllCompliance),
            Arc::new(AlwaysConsentedStore),
            orchestrator,
            HashSet::new(),
            0.8,
        )
    }

    fn request() -> ScreeningRequest {
        ScreeningRequest {
            subject: Subject {
                id: SubjectId::new(),
                kind: SubjectKind::Individual,
                declared: DeclaredIdentifiers {
                    names: vec!["Jane Roe".into()],
                    ..Default::default()
                },
                tenant_id: TenantId::new(),
            },
            service_config: ServiceConfig {
                tier: ServiceTier::Standard,
                degree: Degree::D1,
                vigilance: VigilanceLevel::V0,
            },
            tenant_id: TenantId::new(),
            user_id: "recruiter-1".to_string(),
            correlation_id: "corr-1".to_string(),
            locale: "US".to_string(),
            role: "recruiter".to_string(),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn replayed_correlation_id_returns_original_result() {
        let engine = build_engine();
        let first = request();
        let mut second = request();
        second.correlation_id = first.correlation_id.clone();
        second.tenant_id = first.tenant_id;

        let first_result = engine.start_screening(first).await.expect("first screening succeeds");
        let replay_result = engine.start_screening(second).await.expect("replay returns the original result");
        assert_eq!(first_result.screening_id, replay_result.screening_id);
    }

    #[tokio::test]
    async fn concurrent_duplicate_correlation_id_is_rejected() {
        let engine = Arc::new(build_engine());
        let first = request();
        let mut second = request();
        second.correlation_id = first.correlation_id.clone();
        second.tenant_id = first.tenant_id;

        // Insert an in-progress slot directly to simulate a second caller
        // racing a still-running screening for the same correlation id,
        // without depending on timing of the first call's internal awaits.
        let key = (first.tenant_id, first.correlation_id.clone());
        engine.idempotency.insert(key, IdempotencySlot::InProgress(ScreeningId::new()));

        let result = engine.start_screening(second).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_service_config_is_rejected_before_any_work() {
        let engine = build_engine();
        let mut req = request();
        req.service_config.degree = Degree::D3;
        req.service_config.tier = ServiceTier::Standard;

        let result = engine.start_screening(req).await;
        assert!(result.is_err());
    }

    /// Spec §5: "A cancelled screening must not produce a ProfileVersion."
    #[tokio::test]
    async fn expired_deadline_cancels_without_producing_a_profile_version() {
        let engine = build_engine();
        let mut req = request();
        req.deadline = Some(Utc::now() - chrono::Duration::seconds(1));

        let result = engine.start_screening(req).await;
        assert!(result.is_err());
    }

    /// Spec §7: "User-visible failure: the screening's final status plus a
    /// list of `{info_type, terminal_state, reason}` tuples" — a cancelled
    /// screening's error must carry that list rather than discarding it.
    #[tokio::test]
    async fn cancelled_error_carries_per_type_terminal_states() {
        let engine = build_engine();
        let mut req = request();
        req.deadline = Some(Utc::now() - chrono::Duration::seconds(1));

        let err = engine.start_screening(req).await.unwrap_err();
        let type_states = err
            .context
            .metadata
            .get("type_states")
            .expect("cancelled error carries a type_states tuple list");
        assert!(type_states.is_array());
    }

    #[tokio::test]
    async fn monitoring_run_links_to_its_predecessor() {
        let engine = build_engine();
        let first = engine.start_screening(request()).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.trigger, ScreeningTrigger::Screening);
        assert!(first.previous_version.is_none());

        let mut follow_up = request();
        follow_up.subject.id = first.subject_id;
        follow_up.tenant_id = first.tenant_id;
        follow_up.correlation_id = "monitor-1".to_string();

        let second = engine
            .start_monitoring_run(follow_up, &first, ScreeningTrigger::Monitoring)
            .await
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.previous_version, Some(1));
        assert_eq!(second.trigger, ScreeningTrigger::Monitoring);
    }
}
