//! Network-expansion entities for D2/D3 degrees (spec §3 `Entity` /
//! `EntityRelation`).

use screening_core::ScreeningId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub source_fact_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Employer,
    Associate,
    FamilyMember,
    BusinessPartner,
    Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelation {
    pub from: String,
    pub to: String,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub discovered_in: ScreeningId,
}
