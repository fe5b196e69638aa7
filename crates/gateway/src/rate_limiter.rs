//! Per-provider sliding-window rate limiter. Each provider gets its own
//! `tokio::sync::Mutex<VecDeque<Instant>>`, keyed in a `DashMap` — the gate
//! is the only synchronization point between concurrent queries targeting
//! the same provider.

use dashmap::DashMap;
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
        }
    }

    fn window_for(&self, provider_id: &str) -> Arc<Mutex<VecDeque<Instant>>> {
        Arc::clone(
            self.windows
                .entry(provider_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                .value(),
        )
    }

    /// Blocks until an admission slot opens for `provider_id`, then takes
    /// it. Cooperative: waiters are not ordered, but each one only proceeds
    /// once fewer than `limit_per_minute` admissions remain in the window.
    pub async fn acquire(&self, provider_id: &str, limit_per_minute: u32) {
        let window = self.window_for(provider_id);

        loop {
            let wait = {
                let mut admissions = window.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = admissions.front() {
                    if now.duration_since(oldest) >= WINDOW {
                        admissions.pop_front();
                    } else {
                        break;
                    }
                }

                if admissions.len() < limit_per_minute as usize {
                    admissions.push_back(now);
                    None
                } else {
                    let oldest = *admissions.front().unwrap();
                    Some(WINDOW - now.duration_since(oldest))
                }
            };

            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_then_waits_for_window() {
        let limiter = RateLimiter::new();

        for _ in 0..3 {
            limiter.acquire("p1", 3).await;
        }

        let started = Instant::now();
        limiter.acquire("p1", 3).await;
        assert!(Instant::now().duration_since(started) >= Duration::from_secs(59));
    }
}
