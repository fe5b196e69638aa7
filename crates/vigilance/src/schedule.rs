//! Monitoring schedule: the persisted `{vigilance_level, next_check_at,
//! baseline_version}` per subject the scheduler scans each cycle (spec §4.14).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use screening_core::{Error, ErrorCode, Result, SubjectId, TenantId};
use screening_engine::{ServiceConfig, VigilanceLevel};

/// A subject's standing re-screen cadence. Beyond the four fields spec §4.14
/// names, this carries the `(service_config, locale, role)` a re-screen
/// needs to rebuild a `ScreeningRequest` without consulting the original
/// requester again.
#[derive(Debug, Clone)]
pub struct MonitoringSchedule {
    pub subject_id: SubjectId,
    pub tenant_id: TenantId,
    pub vigilance_level: VigilanceLevel,
    pub next_check_at: DateTime<Utc>,
    pub baseline_version: u32,
    pub service_config: ServiceConfig,
    pub locale: String,
    pub role: String,
}

impl MonitoringSchedule {
    pub fn new(
        subject_id: SubjectId,
        tenant_id: TenantId,
        vigilance_level: VigilanceLevel,
        baseline_version: u32,
        service_config: ServiceConfig,
        locale: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        let next_check_at = vigilance_level
            .cadence_days()
            .map(|days| Utc::now() + chrono::Duration::days(days))
            .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC);

        Self {
            subject_id,
            tenant_id,
            vigilance_level,
            next_check_at,
            baseline_version,
            service_config,
            locale: locale.into(),
            role: role.into(),
        }
    }

    /// Advances `next_check_at` by this level's cadence from `from`, and
    /// updates the baseline pointer to the version a completed check just
    /// produced. `V0` schedules are never due, so their next check recedes
    /// to the end of time rather than looping every tick.
    pub fn advance(&mut self, from: DateTime<Utc>, new_baseline_version: u32) {
        self.baseline_version = new_baseline_version;
        self.next_check_at = match self.vigilance_level.cadence_days() {
            Some(days) => from + chrono::Duration::days(days),
            None => DateTime::<Utc>::MAX_UTC,
        };
    }
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn upsert(&self, schedule: MonitoringSchedule) -> Result<()>;
    async fn get(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Option<MonitoringSchedule>>;
    /// Schedules whose `next_check_at` has passed `now`.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringSchedule>>;
}

/// Local, non-durable `ScheduleStore` for tests and single-node operation.
/// A production deployment backs this with Postgres, as `InMemoryProfileStore`
/// documents for the engine's own store.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: DashMap<(SubjectId, TenantId), MonitoringSchedule>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn upsert(&self, schedule: MonitoringSchedule) -> Result<()> {
        self.schedules.insert((schedule.subject_id, schedule.tenant_id), schedule);
        Ok(())
    }

    async fn get(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Option<MonitoringSchedule>> {
        Ok(self.schedules.get(&(subject_id, tenant_id)).map(|s| s.clone()))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoringSchedule>> {
        Ok(self
            .schedules
            .iter()
            .filter(|entry| entry.value().next_check_at <= now)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

/// Convenience used by callers that expect a schedule to already exist
/// (e.g. a webhook-triggered re-screen for a subject under vigilance).
pub async fn require_schedule(
    store: &dyn ScheduleStore,
    subject_id: SubjectId,
    tenant_id: TenantId,
) -> Result<MonitoringSchedule> {
    store.get(subject_id, tenant_id).await?.ok_or_else(|| {
        Error::new(ErrorCode::ScheduleNotFound, format!("no monitoring schedule for subject {subject_id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use screening_engine::{Degree, ServiceTier};

    fn config(level: VigilanceLevel) -> ServiceConfig {
        ServiceConfig { tier: ServiceTier::Standard, degree: Degree::D1, vigilance: level }
    }

    #[tokio::test]
    async fn v0_schedule_is_never_due() {
        let store = InMemoryScheduleStore::new();
        let schedule = MonitoringSchedule::new(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V0,
            1,
            config(VigilanceLevel::V0),
            "US",
            "recruiter",
        );
        store.upsert(schedule).await.unwrap();

        let due = store.due(DateTime::<Utc>::MAX_UTC - chrono::Duration::days(1)).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn v3_schedule_becomes_due_after_fifteen_days() {
        let store = InMemoryScheduleStore::new();
        let mut schedule = MonitoringSchedule::new(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V3,
            1,
            config(VigilanceLevel::V3),
            "US",
            "recruiter",
        );
        schedule.next_check_at = Utc::now() - chrono::Duration::minutes(1);
        store.upsert(schedule).await.unwrap();

        let due = store.due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn advance_moves_baseline_and_next_check() {
        let mut schedule = MonitoringSchedule::new(
            SubjectId::new(),
            TenantId::new(),
            VigilanceLevel::V2,
            3,
            config(VigilanceLevel::V2),
            "US",
            "recruiter",
        );
        let now = Utc::now();
        schedule.advance(now, 4);
        assert_eq!(schedule.baseline_version, 4);
        assert!(schedule.next_check_at > now);
    }
}
