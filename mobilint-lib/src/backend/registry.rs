use std::collections::HashMap;
use std::sync::Arc;

use super::{Backend, BackendConfigs, ChatBackend, RemoteBackend};
use crate::ratelimit::{QuotaConfig, RateLimiter};
use crate::{ErrorKind, Result};

/// Lookup table from [`Backend`] to its implementation.
///
/// Registration order is the fallback priority order used by the selector.
#[derive(Debug, Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<Backend, Arc<dyn RemoteBackend>>,
    order: Vec<Backend>,
    quotas: HashMap<Backend, QuotaConfig>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation with its backend's default quota
    pub fn register(&mut self, implementation: Arc<dyn RemoteBackend>) -> &mut Self {
        let quota = QuotaConfig::default_for(implementation.backend());
        self.register_with_quota(implementation, quota)
    }

    /// Register an implementation with an explicit quota.
    ///
    /// Registering a backend twice replaces the earlier implementation but
    /// keeps its position in the priority order.
    pub fn register_with_quota(
        &mut self,
        implementation: Arc<dyn RemoteBackend>,
        quota: QuotaConfig,
    ) -> &mut Self {
        let backend = implementation.backend();
        if self.backends.insert(backend, implementation).is_none() {
            self.order.push(backend);
        }
        self.quotas.insert(backend, quota);
        self
    }

    /// Build a [`ChatBackend`] for each of `backends`, in that order.
    ///
    /// Backends without an API key are skipped with a warning, so a partial
    /// setup still runs with what is available.
    ///
    /// # Errors
    ///
    /// Fails if a backend is configured with a capacity of zero or an HTTP
    /// client cannot be created.
    pub fn from_configs(backends: &[Backend], mut configs: BackendConfigs) -> Result<Self> {
        let mut registry = Self::new();
        for &backend in backends {
            let config = configs.remove(&backend).unwrap_or_default();
            let quota = config.effective_quota(backend);
            if quota.capacity == 0 {
                return Err(ErrorKind::ZeroCapacity(backend));
            }
            match ChatBackend::from_config(backend, config) {
                Ok(chat) => {
                    registry.register_with_quota(Arc::new(chat), quota);
                }
                Err(e @ ErrorKind::MissingApiKey(_)) => log::warn!("Skipping {backend}: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(registry)
    }

    /// Look up the implementation of a backend
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BackendNotRegistered`] for unknown backends.
    pub fn get(&self, backend: Backend) -> Result<Arc<dyn RemoteBackend>> {
        self.backends
            .get(&backend)
            .cloned()
            .ok_or(ErrorKind::BackendNotRegistered(backend))
    }

    /// Registered backends in priority order
    #[must_use]
    pub fn backends(&self) -> &[Backend] {
        &self.order
    }

    #[must_use]
    pub fn contains(&self, backend: Backend) -> bool {
        self.backends.contains_key(&backend)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// A rate limiter with one quota per registered backend
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.order.iter().map(|b| {
            let quota = self
                .quotas
                .get(b)
                .copied()
                .unwrap_or_else(|| QuotaConfig::default_for(*b));
            (*b, quota)
        }))
    }
}
