//! `mobilint` finds security, performance, memory and battery defects in
//! mobile app repositories.
//!
//! Every file is checked by fast local pattern detectors first. Remote
//! analysis backends may then augment those results, each within its own
//! request quota. Requests no backend can admit right away are deferred and
//! replayed later, so a run never fails because a quota ran out.
//!
//! ```no_run
//! use mobilint_lib::{AnalysisMode, AnalysisOptions, Orchestrator, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let orchestrator = Orchestrator::local()?;
//!   let options = AnalysisOptions {
//!       analysis_mode: AnalysisMode::Local,
//!       ..AnalysisOptions::default()
//!   };
//!   let report = orchestrator
//!       .analyze_repository("https://github.com/android/sunflower", options, CancellationToken::new())
//!       .await;
//!   println!("{}", report.read().status());
//!   Ok(())
//! }
//! ```
//!
//! Remote backends are registered in a [`BackendRegistry`] and handed to an
//! [`OrchestratorBuilder`], which grants full control over lanes, delays and
//! the deferred queue.
// #![deny(missing_docs)]

mod types;
mod utils;

pub mod backend;
pub mod classify;
pub mod deferred;
pub mod detector;
pub mod fetch;
pub mod orchestrator;
pub mod ratelimit;
pub mod report;
#[cfg(test)]
pub(crate) mod test_utils;

pub use backend::{Backend, BackendRegistry, RemoteBackend};
pub use deferred::{DeferredQueue, DrainConfig, DrainOutcome, DrainSummary};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use ratelimit::{RateLimiter, Selector};
pub use report::{Report, ReportStatus, ReportStore, SharedReport};
pub use types::*;

/// Default user agent, `mobilint/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("mobilint/", env!("CARGO_PKG_VERSION"));
