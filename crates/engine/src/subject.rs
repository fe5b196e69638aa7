//! Subject and service configuration types (spec §3: `Subject`, `ServiceConfig`).

use chrono::{DateTime, NaiveDate, Utc};
use screening_core::{Error, InformationType, Result, SubjectId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Individual,
    Organization,
    Address,
}

/// Identifiers the requester declares about the subject up front. These
/// seed iteration-1 queries before any facts have been corroborated by a
/// provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaredIdentifiers {
    pub names: Vec<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub tax_id: Option<String>,
    pub addresses: Vec<String>,
    pub claimed_employers: Vec<String>,
    pub claimed_schools: Vec<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

/// The entity being screened. Immutable for the duration of a screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub kind: SubjectKind,
    pub declared: DeclaredIdentifiers,
    pub tenant_id: TenantId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceTier {
    Standard,
    Enhanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Degree {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VigilanceLevel {
    V0,
    V1,
    V2,
    V3,
}

impl VigilanceLevel {
    /// Re-screen cadence, or `None` for `V0` which never re-runs.
    pub fn cadence_days(self) -> Option<i64> {
        match self {
            VigilanceLevel::V0 => None,
            VigilanceLevel::V1 => Some(365),
            VigilanceLevel::V2 => Some(30),
            VigilanceLevel::V3 => Some(15),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VigilanceLevel::V0 => "V0",
            VigilanceLevel::V1 => "V1",
            VigilanceLevel::V2 => "V2",
            VigilanceLevel::V3 => "V3",
        }
    }
}

impl std::fmt::Display for VigilanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The information types a vigilance re-screen at this level is allowed to
/// touch (spec §4.14). `None` means the full permitted set (V1, and V0
/// which never re-screens at all); `Some` restricts a monitoring check to
/// the named types regardless of what tier/degree would otherwise permit.
pub fn vigilance_scope(level: VigilanceLevel) -> Option<HashSet<InformationType>> {
    match level {
        VigilanceLevel::V0 | VigilanceLevel::V1 => None,
        VigilanceLevel::V2 | VigilanceLevel::V3 => Some(
            [
                InformationType::Criminal,
                InformationType::Sanctions,
                InformationType::AdverseMedia,
                InformationType::Civil,
                InformationType::Regulatory,
            ]
            .into_iter()
            .collect(),
        ),
    }
}

/// `{tier, degree, vigilance}` with the invariant `degree = D3 => tier = ENHANCED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub tier: ServiceTier,
    pub degree: Degree,
    pub vigilance: VigilanceLevel,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.degree == Degree::D3 && self.tier != ServiceTier::Enhanced {
            return Err(Error::new(
                screening_core::ErrorCode::InvalidConfig,
                "degree D3 requires tier ENHANCED",
            ));
        }
        Ok(())
    }
}

/// `{subject, service_config, tenant_id, user_id, correlation_id, deadline?}`
/// (spec §6 `start_screening` inbound operation).
#[derive(Debug, Clone)]
pub struct ScreeningRequest {
    pub subject: Subject,
    pub service_config: ServiceConfig,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub correlation_id: String,
    pub locale: String,
    pub role: String,
    pub deadline: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d3_without_enhanced_is_rejected() {
        let cfg = ServiceConfig {
            tier: ServiceTier::Standard,
            degree: Degree::D3,
            vigilance: VigilanceLevel::V0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn v2_scope_excludes_foundation_types() {
        let scope = vigilance_scope(VigilanceLevel::V2).unwrap();
        assert!(scope.contains(&InformationType::Criminal));
        assert!(!scope.contains(&InformationType::Identity));
    }

    #[test]
    fn v1_scope_is_unrestricted() {
        assert!(vigilance_scope(VigilanceLevel::V1).is_none());
    }

    #[test]
    fn d3_with_enhanced_is_accepted() {
        let cfg = ServiceConfig {
            tier: ServiceTier::Enhanced,
            degree: Degree::D3,
            vigilance: VigilanceLevel::V0,
        };
        assert!(cfg.validate().is_ok());
    }
}
