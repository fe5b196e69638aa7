use super::store::CachedResponse;
use chrono::{DateTime, Duration, Utc};
use screening_core::InformationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessStatus {
    Fresh,
    Stale,
    Expired,
}

pub fn classify(entry: &CachedResponse, now: DateTime<Utc>) -> FreshnessStatus {
    if now < entry.fresh_until {
        FreshnessStatus::Fresh
    } else if now < entry.stale_until {
        FreshnessStatus::Stale
    } else {
        FreshnessStatus::Expired
    }
}

/// Whether a service tier may reuse a cache entry in its current freshness
/// state, per the executor's cache step (spec §4.4): `EXPIRED` always
/// refreshes; `STALE` is reusable only for `STANDARD`; `FRESH` is always
/// reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseDecision {
    UseCached { stale: bool },
    MustRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTier {
    Standard,
    Enhanced,
}

pub fn reuse_decision(status: FreshnessStatus, tier: ServiceTier) -> ReuseDecision {
    match (status, tier) {
        (FreshnessStatus::Fresh, _) => ReuseDecision::UseCached { stale: false },
        (FreshnessStatus::Stale, ServiceTier::Standard) => ReuseDecision::UseCached { stale: true },
        (FreshnessStatus::Stale, ServiceTier::Enhanced) => ReuseDecision::MustRefresh,
        (FreshnessStatus::Expired, _) => ReuseDecision::MustRefresh,
    }
}

/// Default `(fresh_for, stale_for)` windows per check type. Records that
/// change rarely (identity, education) get long windows; records that shift
/// quickly or carry reputational risk (adverse media, sanctions) get short
/// ones so a stale hit never survives long without a refresh attempt.
pub fn default_ttl(check_type: InformationType) -> (Duration, Duration) {
    match check_type {
        InformationType::Identity | InformationType::Education => {
            (Duration::days(90), Duration::days(365))
        }
        InformationType::Licenses | InformationType::Employment => {
            (Duration::days(30), Duration::days(180))
        }
        InformationType::Criminal | InformationType::Civil | InformationType::Financial => {
            (Duration::days(14), Duration::days(60))
        }
        InformationType::Regulatory | InformationType::Sanctions => {
            (Duration::days(7), Duration::days(30))
        }
        InformationType::AdverseMedia | InformationType::DigitalFootprint => {
            (Duration::days(1), Duration::days(7))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::CacheOrigin;
    use chrono::Duration;
    use screening_core::InformationType;
    use serde_json::json;

    fn entry_at(fresh_until: DateTime<Utc>, stale_until: DateTime<Utc>) -> CachedResponse {
        CachedResponse {
            subject_id: screening_core::SubjectId::new(),
            check_type: InformationType::Criminal,
            provider_id: "p1".to_string(),
            origin: CacheOrigin::PaidExternal,
            tenant_id: None,
            acquired_at: Utc::now(),
            fresh_until,
            stale_until,
            normalized: json!([]),
            raw_encrypted: Vec::new(),
            cost: 0.0,
        }
    }

    #[test]
    fn classifies_by_window() {
        let now = Utc::now();
        let fresh = entry_at(now + Duration::hours(1), now + Duration::hours(2));
        assert_eq!(classify(&fresh, now), FreshnessStatus::Fresh);

        let stale = entry_at(now - Duration::hours(1), now + Duration::hours(1));
        assert_eq!(classify(&stale, now), FreshnessStatus::Stale);

        let expired = entry_at(now - Duration::hours(2), now - Duration::hours(1));
        assert_eq!(classify(&expired, now), FreshnessStatus::Expired);
    }

    #[test]
    fn enhanced_tier_always_refreshes_stale() {
        assert_eq!(
            reuse_decision(FreshnessStatus::Stale, ServiceTier::Enhanced),
            ReuseDecision::MustRefresh
        );
        assert_eq!(
            reuse_decision(FreshnessStatus::Stale, ServiceTier::Standard),
            ReuseDecision::UseCached { stale: true }
        );
    }
}
