//! Outbound collaborator interfaces the core consumes but does not own
//! (spec §6): `ComplianceOracle`, `ConsentStore`. Concrete rule catalogs
//! and consent records are non-goals; these traits are the only surface
//! the engine calls.

use crate::subject::ServiceTier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use screening_core::{InformationType, Result, SubjectId, TenantId};
use std::collections::HashSet;

#[async_trait]
pub trait ComplianceOracle: Send + Sync {
    async fn permit(
        &self,
        check_type: InformationType,
        locale: &str,
        role: &str,
        tier: ServiceTier,
    ) -> bool;

    /// Relevance-to-role multiplier the finding classifier applies for
    /// `(category, role)` (spec §4.12).
    async fn relevance_multiplier(&self, category: &str, role: &str) -> f64 {
        let _ = (category, role);
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct ConsentStatus {
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn verify(
        &self,
        subject_id: SubjectId,
        required_scope: &str,
        tenant_id: TenantId,
    ) -> Result<ConsentStatus>;
}

/// In-memory allow-list implementation for local operation and testing.
/// The actual rule catalog and consent records remain external
/// non-goals; this adapter exists so the engine is runnable without a
/// production compliance service wired in.
pub struct AllowAllCompliance;

#[async_trait]
impl ComplianceOracle for AllowAllCompliance {
    async fn permit(&self, _check_type: InformationType, _locale: &str, _role: &str, _tier: ServiceTier) -> bool {
        true
    }
}

/// Restricts an inner oracle's permits to a closed set of information
/// types, independent of tier/locale/role (spec §4.14 vigilance scope:
/// V2/V3 monitoring checks only re-run criminal/sanctions/adverse-media/
/// civil/regulatory, never the full foundation+records+intelligence set).
pub struct ScopedOracle<'a> {
    pub inner: &'a dyn ComplianceOracle,
    pub allowed: &'a HashSet<InformationType>,
}

#[async_trait]
impl<'a> ComplianceOracle for ScopedOracle<'a> {
    async fn permit(&self, check_type: InformationType, locale: &str, role: &str, tier: ServiceTier) -> bool {
        self.allowed.contains(&check_type) && self.inner.permit(check_type, locale, role, tier).await
    }

    async fn relevance_multiplier(&self, category: &str, role: &str) -> f64 {
        self.inner.relevance_multiplier(category, role).await
    }
}

pub struct AlwaysConsentedStore;

#[async_trait]
impl ConsentStore for AlwaysConsentedStore {
    async fn verify(&self, _subject_id: SubjectId, _required_scope: &str, _tenant_id: TenantId) -> Result<ConsentStatus> {
        Ok(ConsentStatus { valid: true, expires_at: None })
    }
}
