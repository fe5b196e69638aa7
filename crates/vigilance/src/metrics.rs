//! Prometheus counters for the vigilance scheduler, grounded on the
//! teacher's `AuthMetrics` (construct-then-`register_all`).

use prometheus::{IntCounter, IntCounterVec, Opts};
use screening_core::MetricsRegistry;

#[derive(Debug, Clone)]
pub struct VigilanceMetrics {
    pub cycles_run_total: IntCounter,
    pub schedules_checked_total: IntCounter,
    pub rescreens_triggered_total: IntCounterVec,
    pub rescreen_failures_total: IntCounterVec,
    pub alerts_emitted_total: IntCounterVec,
}

impl VigilanceMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let cycles_run_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_vigilance_cycles_run_total"),
            "Total number of scheduler tick cycles executed",
        ))?;

        let schedules_checked_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_vigilance_schedules_checked_total"),
            "Total number of monitoring schedules evaluated as due",
        ))?;

        let rescreens_triggered_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_vigilance_rescreens_triggered_total"),
                "Total number of monitoring re-screens started",
            ),
            &["vigilance_level"],
        )?;

        let rescreen_failures_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_vigilance_rescreen_failures_total"),
                "Total number of monitoring re-screens that failed",
            ),
            &["vigilance_level", "reason"],
        )?;

        let alerts_emitted_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_vigilance_alerts_emitted_total"),
                "Total number of alerts raised by the delta detector",
            ),
            &["vigilance_level", "max_severity"],
        )?;

        Ok(Self {
            cycles_run_total,
            schedules_checked_total,
            rescreens_triggered_total,
            rescreen_failures_total,
            alerts_emitted_total,
        })
    }

    pub fn register_all(&self, registry: &MetricsRegistry) -> Result<(), prometheus::Error> {
        registry.register(self.cycles_run_total.clone())?;
        registry.register(self.schedules_checked_total.clone())?;
        registry.register(self.rescreens_triggered_total.clone())?;
        registry.register(self.rescreen_failures_total.clone())?;
        registry.register(self.alerts_emitted_total.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_construct_without_namespace_collisions() {
        let metrics = VigilanceMetrics::new("screening").unwrap();
        metrics.cycles_run_total.inc();
        assert_eq!(metrics.cycles_run_total.get(), 1);
    }
}
