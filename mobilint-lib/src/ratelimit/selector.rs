use std::sync::Arc;

use super::RateLimiter;
use crate::backend::Backend;

/// Picks an admissible backend.
///
/// The preferred backend wins whenever it has capacity. Otherwise the
/// candidates are tried in the order given, which is the fixed priority
/// order of the configured backends. There is no load balancing, so
/// failover is predictable.
#[derive(Debug, Clone)]
pub struct Selector {
    limiter: Arc<RateLimiter>,
}

impl Selector {
    #[must_use]
    pub const fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// All registered backends in priority order
    #[must_use]
    pub fn candidates(&self) -> &[Backend] {
        self.limiter.backends()
    }

    /// Return an available backend without recording a use
    #[must_use]
    pub fn select(&self, preferred: Backend, candidates: &[Backend]) -> Option<Backend> {
        if self.limiter.is_available(preferred) {
            return Some(preferred);
        }
        let fallback = candidates
            .iter()
            .copied()
            .filter(|&b| b != preferred)
            .find(|&b| self.limiter.is_available(b));
        if let Some(backend) = fallback {
            log::info!("Switching from {preferred} to {backend}");
        }
        fallback
    }

    /// Like [`Selector::select`], but also records the use of the chosen
    /// backend atomically with its availability check
    #[must_use]
    pub fn acquire(&self, preferred: Backend, candidates: &[Backend]) -> Option<Backend> {
        if self.limiter.try_acquire(preferred) {
            return Some(preferred);
        }
        let fallback = candidates
            .iter()
            .copied()
            .filter(|&b| b != preferred)
            .find(|&b| self.limiter.try_acquire(b));
        if let Some(backend) = fallback {
            log::info!("Switching from {preferred} to {backend}");
        }
        fallback
    }
}
