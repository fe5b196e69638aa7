//! Investigation & monitoring engine: the SAR (search/assess/refine) loop
//! that drives subject screening to a scored, classified profile.

pub mod assessor;
pub mod compliance;
pub mod controller;
pub mod entity;
pub mod fact;
pub mod finding;
pub mod info_type_manager;
pub mod knowledge_base;
pub mod orchestrator;
pub mod planner;
pub mod postgres_store;
pub mod query;
pub mod risk;
pub mod sar_state;
pub mod screening;
pub mod subject;

pub use assessor::{Assessment, Inconsistency, InconsistencySeverity, ResultAssessor};
pub use compliance::{
    AllowAllCompliance, AlwaysConsentedStore, ComplianceOracle, ConsentStatus, ConsentStore, ScopedOracle,
};
pub use controller::{ControllerThresholds, Decision, IterationController};
pub use entity::{Entity, EntityKind, EntityRelation, RelationType};
pub use fact::Fact;
pub use finding::{ClassifierContext, Finding, FindingCategory, FindingExtractor, Severity};
pub use info_type_manager::InformationTypeManager;
pub use knowledge_base::{KnowledgeBase, KnowledgeSnapshot};
pub use orchestrator::{ScreeningOrchestrator, ScreeningRunResult, TypeRunOutcome};
pub use planner::QueryPlanner;
pub use postgres_store::PostgresProfileStore;
pub use query::{QueryKind, QueryResult, QueryStatus, SearchQuery};
pub use risk::{ContributingFactor, Recommendation, RiskLevel, RiskScore, RiskScorer};
pub use sar_state::{IterationRecord, SarState, SarTypeState};
pub use screening::{
    InMemoryProfileStore, ProfileStore, ProfileVersion, ScreeningEngine, ScreeningStatus, ScreeningTrigger,
};
pub use subject::{
    vigilance_scope, DeclaredIdentifiers, Degree, ScreeningRequest, ServiceConfig, ServiceTier, Subject,
    SubjectKind, VigilanceLevel,
};
