//! Default local/dev `AuditBackend`: every event is already written to the
//! structured log by `AuditLogger::log_event` before the backend is ever
//! called, so this one has nothing left to do except satisfy the trait and
//! report healthy. A production deployment swaps this for
//! [`super::DatabaseAuditRepository`] (or fans out to both via
//! [`super::AuditRepository`]).

use super::{
    traits::{AuditBackend, AuditFilter, BackendHealth},
    AuditEvent,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct TracingAuditBackend;

impl TracingAuditBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditBackend for TracingAuditBackend {
    async fn store_event(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }

    async fn retrieve_events(&self, _filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        Ok(Vec::new())
    }

    async fn count_events(&self, _filter: &AuditFilter) -> Result<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        Ok(BackendHealth {
            is_healthy: true,
            message: None,
            last_write: None,
            events_stored_today: None,
        })
    }

    async fn cleanup_old_events(&self, _older_than: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }
}
