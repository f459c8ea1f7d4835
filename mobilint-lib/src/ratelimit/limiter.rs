use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{BackendQuota, BackendStats, BackendStatsMap, QuotaConfig, QuotaSnapshot};
use crate::backend::Backend;

#[derive(Debug)]
struct BackendState {
    quota: Mutex<BackendQuota>,
    stats: Mutex<BackendStats>,
}

/// One sliding-window quota per backend.
///
/// Each backend's quota sits behind its own lock, so checking and recording
/// on different backends never contend. [`RateLimiter::try_acquire`] checks
/// and records under a single lock acquisition and is what concurrent lanes
/// use. The split [`is_available`](RateLimiter::is_available) /
/// [`record_use`](RateLimiter::record_use) pair lets a caller probe several
/// backends before committing to one, which is only race-free for a single
/// caller.
///
/// Backends that were never registered are never available.
#[derive(Debug, Default)]
pub struct RateLimiter {
    backends: HashMap<Backend, BackendState>,
    /// Registration order, which doubles as the fallback priority
    order: Vec<Backend>,
}

impl RateLimiter {
    /// Create a limiter from per-backend quotas.
    ///
    /// The iteration order defines [`RateLimiter::backends`]. Later entries
    /// for an already registered backend replace its quota.
    #[must_use]
    pub fn new(quotas: impl IntoIterator<Item = (Backend, QuotaConfig)>) -> Self {
        let mut limiter = Self::default();
        for (backend, config) in quotas {
            if !limiter.backends.contains_key(&backend) {
                limiter.order.push(backend);
            }
            limiter.backends.insert(
                backend,
                BackendState {
                    quota: Mutex::new(BackendQuota::new(config)),
                    stats: Mutex::new(BackendStats::default()),
                },
            );
        }
        limiter
    }

    /// Register the given backends with their default quotas
    #[must_use]
    pub fn with_defaults(backends: &[Backend]) -> Self {
        Self::new(backends.iter().map(|&b| (b, QuotaConfig::default_for(b))))
    }

    /// Registered backends in registration order
    #[must_use]
    pub fn backends(&self) -> &[Backend] {
        &self.order
    }

    #[must_use]
    pub fn contains(&self, backend: Backend) -> bool {
        self.backends.contains_key(&backend)
    }

    /// See [`BackendQuota::is_available`]
    #[must_use]
    pub fn is_available(&self, backend: Backend) -> bool {
        let Some(state) = self.backends.get(&backend) else {
            return false;
        };
        let available = state.quota.lock().is_available();
        if !available {
            if let Some(snapshot) = self.snapshot(backend) {
                log::debug!(
                    "{backend} unavailable: {}/{} requests, {:.1}s left in window",
                    snapshot.count,
                    snapshot.capacity,
                    snapshot.remaining.as_secs_f64()
                );
            }
        }
        available
    }

    /// See [`BackendQuota::record_use`]
    pub fn record_use(&self, backend: Backend) {
        if let Some(state) = self.backends.get(&backend) {
            state.quota.lock().record_use();
            state.stats.lock().record_admission();
        }
    }

    /// Check availability and record a use in one step
    #[must_use]
    pub fn try_acquire(&self, backend: Backend) -> bool {
        let Some(state) = self.backends.get(&backend) else {
            return false;
        };
        let acquired = state.quota.lock().try_acquire();
        if acquired {
            state.stats.lock().record_admission();
        }
        acquired
    }

    #[must_use]
    pub fn snapshot(&self, backend: Backend) -> Option<QuotaSnapshot> {
        self.backends
            .get(&backend)
            .map(|state| state.quota.lock().snapshot())
    }

    pub fn record_success(&self, backend: Backend, request_time: Duration) {
        self.with_stats(backend, |stats| stats.record_success(request_time));
    }

    pub fn record_failure(&self, backend: Backend, request_time: Duration) {
        self.with_stats(backend, |stats| stats.record_failure(request_time));
    }

    pub fn record_deferral(&self, backend: Backend) {
        self.with_stats(backend, BackendStats::record_deferral);
    }

    fn with_stats(&self, backend: Backend, f: impl FnOnce(&mut BackendStats)) {
        if let Some(state) = self.backends.get(&backend) {
            f(&mut state.stats.lock());
        }
    }

    /// A copy of the statistics of every registered backend
    #[must_use]
    pub fn stats(&self) -> BackendStatsMap {
        self.backends
            .iter()
            .map(|(backend, state)| (*backend, state.stats.lock().clone()))
            .collect::<HashMap<_, _>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_backends_are_independent() {
        let limiter = RateLimiter::new([
            (Backend::OpenAi, QuotaConfig::new(1, WINDOW)),
            (Backend::Llama, QuotaConfig::new(2, WINDOW)),
        ]);
        limiter.record_use(Backend::OpenAi);
        assert!(!limiter.is_available(Backend::OpenAi));
        assert!(limiter.is_available(Backend::Llama));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_backend_is_unavailable() {
        let limiter = RateLimiter::with_defaults(&[Backend::OpenAi]);
        assert!(!limiter.is_available(Backend::Gemini));
        assert!(!limiter.try_acquire(Backend::Gemini));
        assert!(limiter.snapshot(Backend::Gemini).is_none());
        limiter.record_use(Backend::Gemini);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_order() {
        let limiter =
            RateLimiter::with_defaults(&[Backend::Llama, Backend::OpenAi, Backend::Llama]);
        assert_eq!(limiter.backends(), &[Backend::Llama, Backend::OpenAi]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_restores_capacity() {
        let limiter = RateLimiter::new([(Backend::DeepSeek, QuotaConfig::new(1, WINDOW))]);
        assert!(limiter.try_acquire(Backend::DeepSeek));
        assert!(!limiter.try_acquire(Backend::DeepSeek));

        advance(WINDOW + Duration::from_secs(1)).await;
        assert!(limiter.try_acquire(Backend::DeepSeek));
        assert_eq!(limiter.stats().get(Backend::DeepSeek).unwrap().admitted, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_try_acquire_never_over_admits() {
        let limiter = Arc::new(RateLimiter::new([(
            Backend::OpenAi,
            QuotaConfig::new(10, Duration::from_secs(3600)),
        )]));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.try_acquire(Backend::OpenAi) })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        assert_eq!(limiter.snapshot(Backend::OpenAi).unwrap().count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_are_recorded() {
        let limiter = RateLimiter::with_defaults(&[Backend::Llama]);
        assert!(limiter.try_acquire(Backend::Llama));
        limiter.record_success(Backend::Llama, Duration::from_millis(10));
        limiter.record_deferral(Backend::Llama);

        let stats = limiter.stats();
        let llama = stats.get(Backend::Llama).unwrap();
        assert_eq!(llama.admitted, 1);
        assert_eq!(llama.succeeded, 1);
        assert_eq!(llama.deferred, 1);
    }
}
