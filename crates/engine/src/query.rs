//! `SearchQuery` / `QueryResult` (spec §3).

use screening_core::InformationType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Initial,
    Enriched,
    GapFill,
    Refinement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_id: String,
    pub info_type: InformationType,
    pub kind: QueryKind,
    pub provider_id: String,
    pub params: Value,
    pub iteration: u32,
    pub targeted_gap: Option<String>,
    /// Completed types that supplied parameters to an `enriched` query.
    pub enrichment_sources: Vec<InformationType>,
}

impl SearchQuery {
    pub fn new(
        info_type: InformationType,
        kind: QueryKind,
        provider_id: impl Into<String>,
        params: Value,
        iteration: u32,
    ) -> Self {
        Self {
            query_id: uuid::Uuid::new_v4().to_string(),
            info_type,
            kind,
            provider_id: provider_id.into(),
            params,
            iteration,
            targeted_gap: None,
            enrichment_sources: Vec::new(),
        }
    }

    /// Canonicalised `(provider_id, params)` key used to collapse
    /// duplicate queries emitted within one iteration (spec §4.7).
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            self.provider_id,
            serde_json::to_string(&self.params).unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Success,
    Failed,
    Timeout,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub provider_id: String,
    pub status: QueryStatus,
    pub raw: Option<screening_gateway::NormalizedRecords>,
    pub latency_ms: u64,
    pub retry_count: u32,
    pub error: Option<String>,
    /// Set when this result was served from a `STALE` cache entry, per
    /// the `stale_data_used` flag a `ProfileVersion` must carry (spec §3).
    pub stale: bool,
}
