//! Knowledge base: write-through fact aggregator, single writer (the
//! assessor), many readers (planner/refiner), spec §3/§4.6.

use crate::{
    entity::{Entity, EntityKind},
    fact::Fact,
};
use screening_core::InformationType;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Immutable derived view handed to readers. A fresh snapshot is built on
/// every `snapshot()` call rather than mutated in place, so a planner
/// holding one is never surprised by a concurrent assessor write.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeSnapshot {
    pub confirmed_names: Vec<String>,
    pub confirmed_date_of_birth: Option<String>,
    pub addresses: Vec<String>,
    pub known_counties: Vec<String>,
    pub known_states: Vec<String>,
    pub employers: Vec<String>,
    pub schools: Vec<String>,
    pub licenses: Vec<String>,
    pub emails: Vec<String>,
    pub usernames: Vec<String>,
    pub discovered_people: Vec<Entity>,
    pub discovered_orgs: Vec<Entity>,
}

struct Inner {
    /// Facts attributed to each information type, keyed by identity so a
    /// repeated `(fact_type, canonical(value))` merges sources instead of
    /// duplicating.
    facts: HashMap<InformationType, HashMap<(String, String), Fact>>,
}

/// One per screening. Owned exclusively by its `Screening` (spec §3
/// Ownership).
pub struct KnowledgeBase {
    inner: RwLock<Inner>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                facts: HashMap::new(),
            }),
        }
    }

    /// De-duplicates incoming facts on `(fact_type, canonical(value))`,
    /// merging sources for facts that already exist, and returns the
    /// subset that were genuinely new to this information type.
    pub async fn record_facts(&self, info_type: InformationType, facts: Vec<Fact>) -> Vec<Fact> {
        let mut inner = self.inner.write().await;
        let bucket = inner.facts.entry(info_type).or_default();

        let mut new_facts = Vec::new();
        for fact in facts {
            let identity = fact.identity();
            match bucket.get_mut(&identity) {
                Some(existing) => {
                    // Corroboration: keep the higher-confidence source id
                    // distinct by appending, tracked via source_provider
                    // concatenation so corroboration counting (assessor)
                    // can still tell distinct sources apart.
                    if !existing.source_provider.split(',').any(|s| s == fact.source_provider) {
                        existing.source_provider =
                            format!("{},{}", existing.source_provider, fact.source_provider);
                    }
                    existing.confidence = existing.confidence.max(fact.confidence);
                }
                None => {
                    bucket.insert(identity, fact.clone());
                    new_facts.push(fact);
                }
            }
        }

        new_facts
    }

    pub async fn facts_for(&self, info_type: InformationType) -> Vec<Fact> {
        let inner = self.inner.read().await;
        inner
            .facts
            .get(&info_type)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct sources corroborating a fact identity, derived
    /// from the merged `source_provider` field (comma-joined ids).
    pub fn source_count(fact: &Fact) -> usize {
        fact.source_provider.split(',').filter(|s| !s.is_empty()).count()
    }

    pub async fn snapshot(&self) -> KnowledgeSnapshot {
        let inner = self.inner.read().await;

        let mut confirmed_names = HashSet::new();
        let mut dob = None;
        let mut addresses = HashSet::new();
        let mut counties = HashSet::new();
        let mut states = HashSet::new();
        let mut employers = HashSet::new();
        let mut schools = HashSet::new();
        let mut licenses = HashSet::new();
        let mut emails = HashSet::new();
        let mut usernames = HashSet::new();
        let mut people = Vec::new();
        let mut orgs = Vec::new();

        for bucket in inner.facts.values() {
            for fact in bucket.values() {
                let text = match &fact.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };

                match fact.fact_type.as_str() {
                    "name_variant" | "confirmed_name" => {
                        confirmed_names.insert(text.clone());
                    }
                    "date_of_birth" => dob = Some(text.clone()),
                    "address" => {
                        addresses.insert(text.clone());
                        if let Some(county) = extract_field(&fact.value, "county") {
                            counties.insert(county);
                        }
                        if let Some(state) = extract_field(&fact.value, "state") {
                            states.insert(state);
                        }
                    }
                    "employer" => {
                        employers.insert(text.clone());
                        orgs.push(Entity {
                            name: text.clone(),
                            kind: EntityKind::Organization,
                            source_fact_type: fact.fact_type.clone(),
                        });
                    }
                    "school" | "degree" => {
                        if let Some(name) = extract_field(&fact.value, "institution").or(Some(text.clone())) {
                            schools.insert(name);
                        }
                    }
                    "license_number" => {
                        licenses.insert(text.clone());
                    }
                    "email" => {
                        emails.insert(text.clone());
                    }
                    "username" => {
                        usernames.insert(text.clone());
                    }
                    "associate" => {
                        people.push(Entity {
                            name: text.clone(),
                            kind: EntityKind::Person,
                            source_fact_type: fact.fact_type.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        KnowledgeSnapshot {
            confirmed_names: confirmed_names.into_iter().collect(),
            confirmed_date_of_birth: dob,
            addresses: addresses.into_iter().collect(),
            known_counties: counties.into_iter().collect(),
            known_states: states.into_iter().collect(),
            employers: employers.into_iter().collect(),
            schools: schools.into_iter().collect(),
            licenses: licenses.into_iter().collect(),
            emails: emails.into_iter().collect(),
            usernames: usernames.into_iter().collect(),
            discovered_people: people,
            discovered_orgs: orgs,
        }
    }
}

fn extract_field(value: &serde_json::Value, field: &str) -> Option<String> {
    value.get(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_facts_merge_sources_instead_of_duplicating() {
        let kb = KnowledgeBase::new();
        let new1 = kb
            .record_facts(
                InformationType::Identity,
                vec![Fact::new("name_variant", json!("Jane Roe"), "p1", 0.8)],
            )
            .await;
        assert_eq!(new1.len(), 1);

        let new2 = kb
            .record_facts(
                InformationType::Identity,
                vec![Fact::new("name_variant", json!("jane  roe"), "p2", 0.9)],
            )
            .await;
        assert!(new2.is_empty(), "duplicate identity should not count as new");

        let facts = kb.facts_for(InformationType::Identity).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(KnowledgeBase::source_count(&facts[0]), 2);
    }

    #[tokio::test]
    async fn snapshot_extracts_county_and_state_from_address_facts() {
        let kb = KnowledgeBase::new();
        kb.record_facts(
            InformationType::Identity,
            vec![Fact::new(
                "address",
                json!({"line1": "1 Main St", "county": "Cook", "state": "IL"}),
                "p1",
                0.9,
            )],
        )
        .await;

        let snap = kb.snapshot().await;
        assert!(snap.known_counties.contains(&"Cook".to_string()));
        assert!(snap.known_states.contains(&"IL".to_string()));
    }
}
