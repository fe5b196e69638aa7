pub mod event;
pub mod logger;
pub mod repository;
pub mod traits;
pub mod tracing_backend;

pub use event::{AuditEvent, AuditEventBuilder, EventSeverity, EventType, EventOutcome};
pub use logger::AuditLogger;
pub use repository::{AuditRepository, DatabaseAuditRepository};
pub use traits::{AuditBackend, Auditable};
pub use tracing_backend::TracingAuditBackend;