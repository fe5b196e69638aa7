//! Prometheus counters for the provider gateway, grounded on
//! `screening_vigilance::metrics::VigilanceMetrics`'s construct-then-
//! `register_all` shape: provider call counters and latency histograms,
//! circuit-breaker state gauges, and cache hit/stale/miss counters (spec §6
//! ambient metrics).

use crate::health::CircuitState;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};
use screening_core::MetricsRegistry;

#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    pub provider_calls_total: IntCounterVec,
    pub provider_latency_ms: HistogramVec,
    pub circuit_state: IntGaugeVec,
    pub cache_outcomes_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let provider_calls_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_gateway_provider_calls_total"),
                "Total number of provider calls dispatched",
            ),
            &["provider_id", "outcome"],
        )?;

        let provider_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                format!("{namespace}_gateway_provider_latency_ms"),
                "Provider call latency in milliseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
            &["provider_id"],
        )?;

        let circuit_state = IntGaugeVec::new(
            Opts::new(
                format!("{namespace}_gateway_circuit_state"),
                "Current circuit breaker state per provider (0=closed, 1=half_open, 2=open)",
            ),
            &["provider_id"],
        )?;

        let cache_outcomes_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_gateway_cache_outcomes_total"),
                "Total number of cache lookups by outcome",
            ),
            &["outcome"],
        )?;

        Ok(Self {
            provider_calls_total,
            provider_latency_ms,
            circuit_state,
            cache_outcomes_total,
        })
    }

    pub fn register_all(&self, registry: &MetricsRegistry) -> Result<(), prometheus::Error> {
        registry.register(self.provider_calls_total.clone())?;
        registry.register(self.provider_latency_ms.clone())?;
        registry.register(self.circuit_state.clone())?;
        registry.register(self.cache_outcomes_total.clone())?;
        Ok(())
    }

    pub fn record_call(&self, provider_id: &str, success: bool, latency_ms: u64) {
        let outcome = if success { "success" } else { "failure" };
        self.provider_calls_total.with_label_values(&[provider_id, outcome]).inc();
        self.provider_latency_ms.with_label_values(&[provider_id]).observe(latency_ms as f64);
    }

    pub fn record_circuit_state(&self, provider_id: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        };
        self.circuit_state.with_label_values(&[provider_id]).set(value);
    }

    pub fn record_cache_hit(&self, stale: bool) {
        let outcome = if stale { "stale" } else { "hit" };
        self.cache_outcomes_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_outcomes_total.with_label_values(&["miss"]).inc();
    }
}
