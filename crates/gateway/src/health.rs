//! Health monitor & circuit breaker: tracks a bounded deque of recent call
//! outcomes per provider and derives `CLOSED`/`OPEN`/`HALF_OPEN` circuit
//! state from it.

use dashmap::DashMap;
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(60);
const CLOSE_SUCCESS_THRESHOLD: u32 = 2;
const OUTCOME_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency_ms: u64,
    at: Instant,
}

struct ProviderHealthState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    outcomes: VecDeque<Outcome>,
    /// Set while `HALF_OPEN` and a single probe call has been admitted
    /// through `try_admit` but its outcome hasn't reached `record_outcome`
    /// yet. Gates concurrent callers so only one probe is in flight at a
    /// time (spec §4.3: HALF_OPEN "permits one probe").
    half_open_probe_in_flight: bool,
}

impl Default for ProviderHealthState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            outcomes: VecDeque::new(),
            half_open_probe_in_flight: false,
        }
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    providers: Arc<DashMap<String, Arc<RwLock<ProviderHealthState>>>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            providers: Arc::new(DashMap::new()),
        }
    }

    fn state_for(&self, provider_id: &str) -> Arc<RwLock<ProviderHealthState>> {
        Arc::clone(
            self.providers
                .entry(provider_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// `is_available` returns false iff the circuit is `OPEN` and has not
    /// yet aged past the cooldown into `HALF_OPEN`. A pure membership check
    /// with no side effects — safe to call for candidate selection or
    /// metrics without affecting the half-open probe gate. See `try_admit`
    /// for the call actually allowed to dispatch.
    pub async fn is_available(&self, provider_id: &str) -> bool {
        let state = self.state_for(provider_id);
        let mut guard = state.write().await;
        self.maybe_transition_to_half_open(&mut guard);
        !matches!(guard.state, CircuitState::Open)
    }

    /// Claims permission to actually dispatch a call to `provider_id` right
    /// now. Identical to `is_available` for `CLOSED`/`OPEN`, but while
    /// `HALF_OPEN` only the first caller to ask is admitted (spec §4.3:
    /// half-open "permits one probe") — every other concurrent caller gets
    /// `false` until that probe's outcome reaches `record_outcome`. Callers
    /// that get `false` here should treat the provider as unavailable for
    /// this attempt rather than dispatching anyway.
    pub async fn try_admit(&self, provider_id: &str) -> bool {
        let state = self.state_for(provider_id);
        let mut guard = state.write().await;
        self.maybe_transition_to_half_open(&mut guard);
        match guard.state {
            CircuitState::Open => false,
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if guard.half_open_probe_in_flight {
                    false
                } else {
                    guard.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    fn maybe_transition_to_half_open(&self, guard: &mut ProviderHealthState) {
        if guard.state == CircuitState::Open {
            if let Some(opened_at) = guard.opened_at {
                if opened_at.elapsed() >= COOLDOWN {
                    guard.state = CircuitState::HalfOpen;
                    guard.half_open_probe_in_flight = false;
                }
            }
        }
    }

    pub async fn circuit_state(&self, provider_id: &str) -> CircuitState {
        let state = self.state_for(provider_id);
        let mut guard = state.write().await;
        self.maybe_transition_to_half_open(&mut guard);
        guard.state
    }

    pub async fn record_outcome(&self, provider_id: &str, success: bool, latency_ms: u64) {
        let state = self.state_for(provider_id);
        let mut guard = state.write().await;
        self.maybe_transition_to_half_open(&mut guard);

        guard.outcomes.push_back(Outcome {
            success,
            latency_ms,
            at: Instant::now(),
        });
        if guard.outcomes.len() > OUTCOME_HISTORY {
            guard.outcomes.pop_front();
        }

        if success {
            guard.consecutive_failures = 0;
            guard.consecutive_successes += 1;

            match guard.state {
                CircuitState::HalfOpen if guard.consecutive_successes >= CLOSE_SUCCESS_THRESHOLD => {
                    guard.state = CircuitState::Closed;
                    guard.opened_at = None;
                }
                _ => {}
            }
        } else {
            guard.consecutive_successes = 0;
            guard.consecutive_failures += 1;

            match guard.state {
                CircuitState::HalfOpen => {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
                CircuitState::Closed if guard.consecutive_failures >= FAILURE_THRESHOLD => {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
                _ => {}
            }
        }

        // Whatever admitted this outcome (the one half-open probe, or
        // ordinary closed-circuit traffic) has now completed; release the
        // gate so the next call — whether that's another half-open probe or
        // a no-op on an already-closed circuit — is evaluated fresh.
        guard.half_open_probe_in_flight = false;
    }

    /// Records the outcome of an out-of-band `Provider::health_check()`
    /// probe (spec §4.3: a periodic health check every 30s probes each
    /// provider; a healthy probe does not alone close the circuit but feeds
    /// the error-rate metric). Unlike `record_outcome`, this never flips
    /// `state`, `opened_at`, or the consecutive counters that the circuit
    /// breaker itself keys off of — only real query traffic through
    /// `record_outcome` can open or close the circuit.
    pub async fn record_probe_outcome(&self, provider_id: &str, success: bool, latency_ms: u64) {
        let state = self.state_for(provider_id);
        let mut guard = state.write().await;
        guard.outcomes.push_back(Outcome {
            success,
            latency_ms,
            at: Instant::now(),
        });
        if guard.outcomes.len() > OUTCOME_HISTORY {
            guard.outcomes.pop_front();
        }
    }

    /// Aggregate error rate over the retained outcome history, fed by both
    /// executor calls and the periodic health-check probe.
    pub async fn error_rate(&self, provider_id: &str) -> f64 {
        let state = self.state_for(provider_id);
        let guard = state.read().await;
        if guard.outcomes.is_empty() {
            return 0.0;
        }
        let failures = guard.outcomes.iter().filter(|o| !o.success).count();
        failures as f64 / guard.outcomes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_five_consecutive_failures() {
        let monitor = HealthMonitor::new();
        for _ in 0..4 {
            monitor.record_outcome("p1", false, 10).await;
        }
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Closed);

        monitor.record_outcome("p1", false, 10).await;
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Open);
        assert!(!monitor.is_available("p1").await);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let monitor = HealthMonitor::new();
        for _ in 0..5 {
            monitor.record_outcome("p1", false, 10).await;
        }
        {
            let state = monitor.state_for("p1");
            let mut guard = state.write().await;
            guard.state = CircuitState::HalfOpen;
            guard.consecutive_successes = 0;
        }

        monitor.record_outcome("p1", false, 10).await;
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn probe_outcome_feeds_error_rate_without_touching_circuit_state() {
        let monitor = HealthMonitor::new();
        for _ in 0..5 {
            monitor.record_outcome("p1", false, 10).await;
        }
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Open);

        monitor.record_probe_outcome("p1", true, 5).await;
        // A circuit that just opened hasn't aged past the cooldown yet, so a
        // lone healthy probe must not have closed it.
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Open);
        assert!(monitor.error_rate("p1").await < 1.0);
    }

    #[tokio::test]
    async fn half_open_closes_after_two_successes() {
        let monitor = HealthMonitor::new();
        {
            let state = monitor.state_for("p1");
            let mut guard = state.write().await;
            guard.state = CircuitState::HalfOpen;
        }

        monitor.record_outcome("p1", true, 10).await;
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::HalfOpen);
        monitor.record_outcome("p1", true, 10).await;
        assert_eq!(monitor.circuit_state("p1").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_admits_only_one_concurrent_probe() {
        let monitor = HealthMonitor::new();
        {
            let state = monitor.state_for("p1");
            let mut guard = state.write().await;
            guard.state = CircuitState::HalfOpen;
        }

        assert!(monitor.try_admit("p1").await);
        // A second caller racing in before the first probe's outcome lands
        // must not also be admitted, even though the circuit still reads as
        // generally available.
        assert!(!monitor.try_admit("p1").await);
        assert!(monitor.is_available("p1").await);

        monitor.record_outcome("p1", true, 10).await;
        // The first probe's outcome freed the gate; a fresh probe may go
        // through (still half-open pending the second success).
        assert!(monitor.try_admit("p1").await);
    }
}
