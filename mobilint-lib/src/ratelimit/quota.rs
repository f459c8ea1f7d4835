use std::time::Duration;

use tokio::time::Instant;

use super::QuotaConfig;

/// Counter state of one backend's quota.
///
/// The counter stays within `[0, capacity]` and the window start only ever
/// moves forward. Time is read from [`tokio::time::Instant`], so a paused
/// test runtime controls window expiry.
#[derive(Debug, Clone)]
pub struct BackendQuota {
    window_start: Instant,
    window: Duration,
    count: usize,
    capacity: usize,
}

/// A read-only view of a [`BackendQuota`] for logging and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    /// Requests recorded in the current window
    pub count: usize,
    /// Maximum requests per window
    pub capacity: usize,
    /// Time left until the current window expires
    pub remaining: Duration,
}

impl BackendQuota {
    /// Create a quota whose first window starts now.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(config: QuotaConfig) -> Self {
        if config.capacity == 0 {
            log::warn!("Quota capacity must be at least 1. Using 1.");
        }
        Self {
            window_start: Instant::now(),
            window: config.window,
            count: 0,
            capacity: config.capacity.max(1),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.window
    }

    fn reset(&mut self, now: Instant, count: usize) {
        log::debug!(
            "Resetting quota window after {} of {} requests",
            self.count,
            self.capacity
        );
        self.window_start = self.window_start.max(now);
        self.count = count;
    }

    /// Check whether another request fits into the current window.
    ///
    /// An expired window is reset to an empty one by this call.
    pub fn is_available(&mut self) -> bool {
        let now = Instant::now();
        if self.expired(now) {
            self.reset(now, 0);
            return true;
        }
        self.count < self.capacity
    }

    /// Record one request.
    ///
    /// If the window expired, a new one starts with this request as its
    /// first use.
    pub fn record_use(&mut self) {
        let now = Instant::now();
        if self.expired(now) {
            self.reset(now, 1);
        } else {
            self.count = (self.count + 1).min(self.capacity);
        }
    }

    /// Check and record in one step. Returns `false` without recording if
    /// the window is full.
    pub fn try_acquire(&mut self) -> bool {
        if !self.is_available() {
            return false;
        }
        self.record_use();
        true
    }

    /// Requests recorded in the current window
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn snapshot(&self) -> QuotaSnapshot {
        let elapsed = Instant::now().saturating_duration_since(self.window_start);
        QuotaSnapshot {
            count: self.count,
            capacity: self.capacity,
            remaining: self.window.saturating_sub(elapsed),
        }
    }
}
