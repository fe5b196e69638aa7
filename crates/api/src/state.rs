use crate::subject_directory::InMemorySubjectDirectory;
use screening_core::{Config, MetricsService};
use screening_engine::{ProfileStore, ScreeningEngine};
use screening_vigilance::ScheduleStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared application state, in the manner of the teacher's `AppState`:
/// the engine composition root plus whatever the handlers need read access
/// to, cloned cheaply per request via `Arc`/`Clone` fields.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ScreeningEngine>,
    pub profile_store: Arc<dyn ProfileStore>,
    pub schedule_store: Arc<dyn ScheduleStore>,
    pub subject_directory: Arc<InMemorySubjectDirectory>,
    pub vigilance: Arc<screening_vigilance::VigilanceScheduler>,
    pub metrics: Arc<MetricsService>,
    pub vigilance_shutdown: Arc<watch::Sender<()>>,
}
