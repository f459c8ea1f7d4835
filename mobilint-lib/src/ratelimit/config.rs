use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::Backend;

/// Default length of a quota window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Quota of a single backend: `capacity` requests per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Maximum requests admitted within one window
    pub capacity: usize,

    /// Length of a window
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
}

/// Default length of a quota window
const fn default_window() -> Duration {
    DEFAULT_WINDOW
}

impl QuotaConfig {
    /// Create a quota of `capacity` requests per `window`
    #[must_use]
    pub const fn new(capacity: usize, window: Duration) -> Self {
        Self { capacity, window }
    }

    /// The quota a backend gets when nothing else is configured
    #[must_use]
    pub const fn default_for(backend: Backend) -> Self {
        let capacity = match backend {
            Backend::OpenAi => 20,
            Backend::DeepSeek => 1,
            Backend::Llama => 5,
            Backend::Gemini => 10,
        };
        Self::new(capacity, DEFAULT_WINDOW)
    }

    /// Apply optional overrides on top of this quota
    #[must_use]
    pub fn with_overrides(self, capacity: Option<usize>, window: Option<Duration>) -> Self {
        Self {
            capacity: capacity.unwrap_or(self.capacity),
            window: window.unwrap_or(self.window),
        }
    }
}
