//! `Fact`: the unit of evidence the assessor extracts and the knowledge
//! base accumulates (spec §3, §4.6).

use chrono::{DateTime, Utc};
use screening_core::utils::canonicalize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fact's identity is `(fact_type, canonical(value))`; two facts sharing
/// an identity from different providers corroborate each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub fact_type: String,
    pub value: Value,
    pub source_provider: String,
    pub confidence: f64,
    pub discovered_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(
        fact_type: impl Into<String>,
        value: Value,
        source_provider: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            fact_type: fact_type.into(),
            value,
            source_provider: source_provider.into(),
            confidence: confidence.clamp(0.0, 1.0),
            discovered_at: Utc::now(),
        }
    }

    /// `(fact_type, canonical(value))` identity. Values that aren't plain
    /// strings canonicalize on their JSON rendering so structured facts
    /// (e.g. `{"employer": "...", "end_date": null}`) still dedup sanely.
    pub fn identity(&self) -> (String, String) {
        let raw = match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        (self.fact_type.clone(), canonicalize(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_canonicalizes_string_values() {
        let a = Fact::new("name_variant", json!("John Doe"), "p1", 0.9);
        let b = Fact::new("name_variant", json!("  john   DOE "), "p2", 0.8);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn confidence_is_clamped() {
        let f = Fact::new("x", json!("y"), "p", 1.5);
        assert_eq!(f.confidence, 1.0);
    }
}
