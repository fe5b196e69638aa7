//! Vigilance scheduler (spec §4.14): a background task that sweeps due
//! monitoring schedules once per tick, re-screens each one within its
//! vigilance scope, detects the delta against its baseline, and alerts.
//!
//! Modeled directly on the teacher's `SessionCleanupService`
//! (`crates/core/src/session/cleanup.rs`): a `JoinHandle`-returning
//! `start()`, an interval-driven `run_loop`, structured `info!`/`error!`
//! logging per cycle, and a per-item (there: per-tenant; here: per-subject)
//! inner method that isolates one failure from the rest of the sweep. This
//! version adds a `tokio::sync::watch`-based shutdown signal, since a
//! production scheduler needs to drain in-flight re-screens on deploy
//! rather than being killed mid-cycle.

use crate::{
    alert::{self, AlertSink},
    delta::DeltaDetector,
    metrics::VigilanceMetrics,
    schedule::{MonitoringSchedule, ScheduleStore},
};
use async_trait::async_trait;
use chrono::Utc;
use screening_core::{
    audit::{AuditEvent, AuditLogger, EventOutcome, EventSeverity, EventType},
    Result, SubjectId, TenantId,
};
use screening_engine::{ProfileStore, ProfileVersion, ScreeningEngine, ScreeningRequest, ScreeningTrigger, Subject};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::interval};
use tracing::{error, info, warn};

/// Resolves the declared identifiers a re-screen needs to rebuild a
/// `ScreeningRequest`, since a `ProfileVersion` publishes findings, not the
/// subject's identity inputs. An external collaborator, in the manner of
/// `ComplianceOracle`/`ConsentStore` (spec §6).
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn load(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Subject>;
}

pub struct VigilanceScheduler {
    schedule_store: Arc<dyn ScheduleStore>,
    profile_store: Arc<dyn ProfileStore>,
    subjects: Arc<dyn SubjectDirectory>,
    engine: Arc<ScreeningEngine>,
    alert_sink: Arc<dyn AlertSink>,
    metrics: VigilanceMetrics,
    tick_interval: Duration,
    max_concurrent_rescreens: usize,
    audit: Option<Arc<AuditLogger>>,
}

impl VigilanceScheduler {
    pub fn new(
        schedule_store: Arc<dyn ScheduleStore>,
        profile_store: Arc<dyn ProfileStore>,
        subjects: Arc<dyn SubjectDirectory>,
        engine: Arc<ScreeningEngine>,
        alert_sink: Arc<dyn AlertSink>,
        metrics: VigilanceMetrics,
        tick_interval: Duration,
        max_concurrent_rescreens: usize,
    ) -> Self {
        Self {
            schedule_store,
            profile_store,
            subjects,
            engine,
            alert_sink,
            metrics,
            tick_interval,
            max_concurrent_rescreens,
            audit: None,
        }
    }

    /// Attaches the shared audit sink (spec §6 `ALERT_GENERATED`/`DeltaDetected`).
    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn emit(&self, tenant_id: TenantId, event_type: EventType, severity: EventSeverity, description: &str) {
        let Some(audit) = &self.audit else { return };
        let event = AuditEvent::builder(event_type, description.to_string())
            .severity(severity)
            .outcome(EventOutcome::Success)
            .tenant_id(tenant_id.to_string())
            .build();
        if let Err(err) = audit.log_event(event).await {
            warn!(error = %err, "failed to record vigilance audit event");
        }
    }

    /// Starts the scheduler in the background. Sending on the returned
    /// `watch::Sender` (any value) requests a graceful stop after the
    /// in-flight cycle finishes.
    pub fn start(self) -> (JoinHandle<()>, watch::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(async move {
            self.run_loop(shutdown_rx).await;
        });
        (handle, shutdown_tx)
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<()>) {
        let mut ticker = interval(self.tick_interval);

        info!(
            interval_seconds = self.tick_interval.as_secs(),
            "vigilance scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(checked) if checked > 0 => {
                            info!(schedules_checked = checked, "vigilance sweep completed");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "vigilance sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("vigilance scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Runs one subject's monitoring check immediately, outside the regular
    /// sweep cadence, for the API layer's webhook intake (spec §2 "webhook
    /// intake for vigilance triggers"). Returns `Ok(false)` rather than an
    /// error if the subject has no standing schedule, since an unsolicited
    /// trigger for an unmonitored subject is a caller mistake, not a fault.
    pub async fn trigger_now(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<bool> {
        let Some(schedule) = self.schedule_store.get(subject_id, tenant_id).await? else {
            return Ok(false);
        };
        self.check_one(&schedule).await?;
        Ok(true)
    }

    /// Sweeps every due schedule once. Returns the number evaluated.
    /// Exposed for manual/admin triggering, mirroring the teacher's
    /// `manual_cleanup`.
    pub async fn run_cycle(&self) -> Result<usize> {
        self.metrics.cycles_run_total.inc();
        let now = Utc::now();
        let due = self.schedule_store.due(now).await?;

        for chunk in due.chunks(self.max_concurrent_rescreens.max(1)) {
            let outcomes = futures::future::join_all(chunk.iter().map(|s| self.check_one(s))).await;
            for (schedule, outcome) in chunk.iter().zip(outcomes) {
                self.metrics.schedules_checked_total.inc();
                if let Err(e) = outcome {
                    warn!(
                        subject_id = %schedule.subject_id,
                        tenant_id = %schedule.tenant_id,
                        error = %e,
                        "monitoring re-screen failed"
                    );
                    self.metrics
                        .rescreen_failures_total
                        .with_label_values(&[schedule.vigilance_level.as_str(), "rescreen_error"])
                        .inc();
                }
            }
        }

        Ok(due.len())
    }

    /// Re-screens one subject, computes its delta against the baseline,
    /// alerts if warranted, and advances the schedule. Isolated per subject
    /// so one failure doesn't abort the sweep, matching the teacher's
    /// per-tenant cleanup isolation.
    async fn check_one(&self, schedule: &MonitoringSchedule) -> Result<()> {
        let subject = self.subjects.load(schedule.subject_id, schedule.tenant_id).await?;

        let baseline = self
            .profile_store
            .latest_version(schedule.subject_id, schedule.tenant_id)
            .await?;

        let request = ScreeningRequest {
            subject,
            service_config: schedule.service_config,
            tenant_id: schedule.tenant_id,
            user_id: "vigilance-scheduler".to_string(),
            correlation_id: format!("monitoring-{}-{}", schedule.subject_id, Utc::now().timestamp()),
            locale: schedule.locale.clone(),
            role: schedule.role.clone(),
            deadline: None,
        };

        self.metrics
            .rescreens_triggered_total
            .with_label_values(&[schedule.vigilance_level.as_str()])
            .inc();

        let current = match &baseline {
            Some(baseline) => {
                self.engine
                    .start_monitoring_run(request, baseline, ScreeningTrigger::Monitoring)
                    .await?
            }
            None => {
                // No baseline yet: this schedule was created ahead of its
                // subject's first completed screening. Treat this check as
                // that first version instead of failing outright.
                self.engine
                    .start_screening(request)
                    .await?
            }
        };

        if let Some(baseline) = &baseline {
            self.raise_alert_if_warranted(schedule, baseline, &current).await?;
        }

        self.profile_store.save(current.clone()).await?;

        let mut updated = schedule.clone();
        updated.advance(Utc::now(), current.version);
        self.schedule_store.upsert(updated).await?;

        Ok(())
    }

    async fn raise_alert_if_warranted(
        &self,
        schedule: &MonitoringSchedule,
        baseline: &ProfileVersion,
        current: &ProfileVersion,
    ) -> Result<()> {
        let delta = DeltaDetector::compute(baseline, current);
        if delta.is_empty() {
            return Ok(());
        }

        self.emit(
            schedule.tenant_id,
            EventType::DeltaDetected,
            EventSeverity::Info,
            &format!(
                "delta detected for subject {} between versions {} and {}",
                schedule.subject_id, baseline.version, current.version
            ),
        )
        .await;

        if let Some(generated) = alert::generate(
            schedule.subject_id,
            schedule.tenant_id,
            schedule.vigilance_level,
            baseline.version,
            current.version,
            delta,
        ) {
            self.metrics
                .alerts_emitted_total
                .with_label_values(&[schedule.vigilance_level.as_str(), generated.max_severity.as_str()])
                .inc();
            self.emit(
                schedule.tenant_id,
                EventType::ProfileAlertRaised,
                EventSeverity::Warning,
                &format!("alert {} raised for subject {}", generated.id, schedule.subject_id),
            )
            .await;
            self.alert_sink.publish(generated).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alert::BroadcastAlertSink, schedule::InMemoryScheduleStore};
    use async_trait::async_trait;
    use screening_core::InformationType;
    use screening_engine::{
        AllowAllCompliance, AlwaysConsentedStore, ControllerThresholds, Degree, InMemoryProfileStore,
        IterationController, QueryPlanner, ScreeningOrchestrator, ServiceConfig, ServiceTier, SubjectKind,
        VigilanceLevel,
    };
    use screening_gateway::{
        HealthMonitor, InMemoryCacheStore, NormalizedRecord, NormalizedRecords, Provider, ProviderError,
        ProviderHealth, ProviderRegistry, ProviderTierCategory, QueryExecutor, QueryParams, RateLimiter,
        RawResponse,
    };
    use std::collections::HashSet;

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
        fn timeout(&self) -> std::time::Duration {
            std::time::Duration::from_secs(5)
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

    struct FixedSubjectDirectory(Subject);

    #[async_trait]
    impl SubjectDirectory for FixedSubjectDirectory {
        async fn load(&self, _subject_id: SubjectId, _tenant_id: TenantId) -> Result<Subject> {
            Ok(self.0.clone())
        }
    }

    fn build_engine() -> Arc<ScreeningEngine> {
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

        Arc::new(ScreeningEngine::new(
            Arc::new(AllowAllCompliance),
            Arc::new(AlwaysConsentedStore),
            orchestrator,
            HashSet::new(),
            0.8,
        ))
    }

    #[tokio::test]
    async fn due_schedule_with_no_baseline_bootstraps_first_version() {
        let subject = Subject {
            id: SubjectId::new(),
            kind: SubjectKind::Individual,
            declared: screening_engine::DeclaredIdentifiers {
                names: vec!["Jane Roe".into()],
                ..Default::default()
            },
            tenant_id: TenantId::new(),
        };

        let schedule_store = Arc::new(InMemoryScheduleStore::new());
        let mut schedule = MonitoringSchedule::new(
            subject.id,
            subject.tenant_id,
            VigilanceLevel::V2,
            0,
            ServiceConfig { tier: ServiceTier::Standard, degree: Degree::D1, vigilance: VigilanceLevel::V2 },
            "US",
            "recruiter",
        );
        schedule.next_check_at = Utc::now() - chrono::Duration::minutes(1);
        schedule_store.upsert(schedule).await.unwrap();

        let profile_store = Arc::new(InMemoryProfileStore::new());
        let scheduler = VigilanceScheduler::new(
            schedule_store.clone(),
            profile_store.clone(),
            Arc::new(FixedSubjectDirectory(subject.clone())),
            build_engine(),
            Arc::new(BroadcastAlertSink::new(8)),
            VigilanceMetrics::new("screening_test").unwrap(),
            Duration::from_secs(60),
            4,
        );

        let checked = scheduler.run_cycle().await.unwrap();
        assert_eq!(checked, 1);

        let saved = profile_store.latest_version(subject.id, subject.tenant_id).await.unwrap();
        assert!(saved.is_some());
        assert_eq!(saved.unwrap().version, 1);

        let advanced = schedule_store.get(subject.id, subject.tenant_id).await.unwrap().unwrap();
        assert_eq!(advanced.baseline_version, 1);
        assert!(advanced.next_check_at > Utc::now());
    }

    #[tokio::test]
    async fn not_yet_due_schedule_is_left_untouched() {
        let schedule_store = Arc::new(InMemoryScheduleStore::new());
        let subject_id = SubjectId::new();
        let tenant_id = TenantId::new();
        let schedule = MonitoringSchedule::new(
            subject_id,
            tenant_id,
            VigilanceLevel::V1,
            1,
            ServiceConfig { tier: ServiceTier::Standard, degree: Degree::D1, vigilance: VigilanceLevel::V1 },
            "US",
            "recruiter",
        );
        schedule_store.upsert(schedule).await.unwrap();

        let subject = Subject {
            id: subject_id,
            kind: SubjectKind::Individual,
            declared: Default::default(),
            tenant_id,
        };
        let scheduler = VigilanceScheduler::new(
            schedule_store,
            Arc::new(InMemoryProfileStore::new()),
            Arc::new(FixedSubjectDirectory(subject)),
            build_engine(),
            Arc::new(BroadcastAlertSink::new(8)),
            VigilanceMetrics::new("screening_test2").unwrap(),
            Duration::from_secs(60),
            4,
        );

        let checked = scheduler.run_cycle().await.unwrap();
        assert_eq!(checked, 0);
    }
}
