//! Per-backend admission control.
//!
//! Every remote backend has its own request quota: at most `capacity`
//! requests inside a window of fixed length. A window starts fresh the first
//! time it is checked after it expired.
//!
//! # Architecture
//!
//! - [`QuotaConfig`]: capacity and window length of one backend
//! - [`BackendQuota`]: the counter state of one backend
//! - [`RateLimiter`]: owns one quota per backend, each behind its own lock
//! - [`Selector`]: picks an admissible backend, preferring a given one
//! - [`BackendStats`]: statistics tracked for each backend

mod config;
mod limiter;
mod quota;
mod selector;
mod stats;

pub use config::{DEFAULT_WINDOW, QuotaConfig};
pub use limiter::RateLimiter;
pub use quota::{BackendQuota, QuotaSnapshot};
pub use selector::Selector;
pub use stats::{BackendStats, BackendStatsMap, RequestTimes};
