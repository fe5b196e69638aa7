//! Vigilance scheduler: periodic/event-driven re-screening (spec §4.14),
//! delta detection against a subject's baseline profile, and alert
//! generation.

pub mod alert;
pub mod delta;
pub mod metrics;
pub mod schedule;
pub mod scheduler;

pub use alert::{Alert, AlertSink, BroadcastAlertSink};
pub use delta::{Delta, DeltaDetector, DeltaEntry, DeltaKind};
pub use metrics::VigilanceMetrics;
pub use schedule::{require_schedule, InMemoryScheduleStore, MonitoringSchedule, ScheduleStore};
pub use scheduler::{SubjectDirectory, VigilanceScheduler};
