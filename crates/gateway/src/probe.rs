//! Periodic provider health-check probe (spec §4.3): every `tick_interval`
//! (30s in production), calls `Provider::health_check()` on each registered
//! provider and feeds the outcome into the `HealthMonitor`'s error-rate
//! history. Modeled on `screening_vigilance::VigilanceScheduler`'s
//! `start()`/`run_loop` shape: a `JoinHandle`-returning `start()` and a
//! `tokio::sync::watch`-based shutdown signal so the probe can be drained on
//! deploy rather than killed mid-sweep.

use crate::{health::HealthMonitor, registry::ProviderRegistry};
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

pub struct HealthProbe {
    registry: ProviderRegistry,
    health: HealthMonitor,
    tick_interval: Duration,
}

impl HealthProbe {
    pub fn new(registry: ProviderRegistry, health: HealthMonitor, tick_interval: Duration) -> Self {
        Self {
            registry,
            health,
            tick_interval,
        }
    }

    /// Starts the probe in the background. Sending on the returned
    /// `watch::Sender` (any value) requests a graceful stop after the
    /// in-flight sweep finishes.
    pub fn start(self) -> (JoinHandle<()>, watch::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(async move {
            self.run_loop(shutdown_rx).await;
        });
        (handle, shutdown_tx)
    }

    async fn run_loop(self, mut shutdown: watch::Receiver<()>) {
        let mut ticker = interval(self.tick_interval);

        info!(
            interval_seconds = self.tick_interval.as_secs(),
            "provider health probe started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let probed = self.run_sweep().await;
                    debug!(providers_probed = probed, "health probe sweep completed");
                }
                _ = shutdown.changed() => {
                    info!("provider health probe shutting down");
                    break;
                }
            }
        }
    }

    /// Probes every registered provider once. Returns the number probed.
    /// Exposed for manual/admin triggering and for tests, mirroring
    /// `VigilanceScheduler::run_cycle`.
    pub async fn run_sweep(&self) -> usize {
        let providers = self.registry.all();
        for provider in &providers {
            let started = std::time::Instant::now();
            let health = provider.health_check().await;
            let latency_ms = if health.latency_ms > 0 {
                health.latency_ms
            } else {
                started.elapsed().as_millis() as u64
            };

            if !health.available {
                warn!(provider_id = provider.id(), "health probe reports provider unavailable");
            }
            self.health
                .record_probe_outcome(provider.id(), health.available, latency_ms)
                .await;
        }
        providers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::CircuitState;
    use crate::provider::{
        NormalizedRecord, NormalizedRecords, Provider, ProviderError, ProviderHealth, ProviderTierCategory,
        QueryParams, RawResponse,
    };
    use async_trait::async_trait;
    use screening_core::InformationType;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingProvider {
        id: &'static str,
        available: bool,
        probes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn id(&self) -> &str {
            self.id
        }
        fn supported_check_types(&self) -> &[InformationType] {
            &[InformationType::Identity]
        }
        fn tier_category(&self) -> ProviderTierCategory {
            ProviderTierCategory::Authoritative
        }
        fn cost_per_query(&self) -> f64 {
            0.0
        }
        fn rate_limit_per_minute(&self) -> u32 {
            60
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn query(
            &self,
            _check_type: InformationType,
            _params: &QueryParams,
        ) -> Result<RawResponse, ProviderError> {
            unimplemented!()
        }
        fn normalize(&self, _raw: &RawResponse) -> NormalizedRecords {
            Vec::new()
        }
        async fn health_check(&self) -> ProviderHealth {
            self.probes.fetch_add(1, Ordering::SeqCst);
            ProviderHealth {
                available: self.available,
                latency_ms: 3,
                error_rate: 0.0,
            }
        }
    }

    #[tokio::test]
    async fn sweep_probes_every_registered_provider() {
        let probes = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new(vec![
            Arc::new(CountingProvider { id: "p1", available: true, probes: probes.clone() }),
            Arc::new(CountingProvider { id: "p2", available: false, probes: probes.clone() }),
        ]);
        let health = HealthMonitor::new();
        let probe = HealthProbe::new(registry, health.clone(), Duration::from_secs(30));

        let count = probe.run_sweep().await;
        assert_eq!(count, 2);
        assert_eq!(probes.load(Ordering::SeqCst), 2);

        // A single unavailable probe result feeds the error-rate history but
        // must not have tripped the circuit breaker, which only reacts to
        // `record_outcome` from real query traffic.
        assert_eq!(health.circuit_state("p2").await, CircuitState::Closed);
        assert!(health.error_rate("p2").await > 0.0);
    }
}
