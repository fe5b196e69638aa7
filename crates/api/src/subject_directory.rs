//! In-memory `SubjectDirectory`: remembers the `Subject` a requester
//! declared on their most recent `POST /screenings` call, so the vigilance
//! scheduler can rebuild a `ScreeningRequest` for a re-screen without a
//! dedicated subject repository, which spec.md leaves external. Grounded
//! on the same `DashMap`-backed local-default pattern as
//! `InMemoryProfileStore`/`InMemoryScheduleStore`.

use async_trait::async_trait;
use dashmap::DashMap;
use screening_core::{Error, ErrorCode, Result, SubjectId, TenantId};
use screening_engine::Subject;
use screening_vigilance::SubjectDirectory;

#[derive(Default)]
pub struct InMemorySubjectDirectory {
    subjects: DashMap<(SubjectId, TenantId), Subject>,
}

impl InMemorySubjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, subject: Subject) {
        self.subjects.insert((subject.id, subject.tenant_id), subject);
    }
}

#[async_trait]
impl SubjectDirectory for InMemorySubjectDirectory {
    async fn load(&self, subject_id: SubjectId, tenant_id: TenantId) -> Result<Subject> {
        self.subjects
            .get(&(subject_id, tenant_id))
            .map(|s| s.clone())
            .ok_or_else(|| Error::new(ErrorCode::ResourceNotFound, format!("no known subject {subject_id}")))
    }
}
