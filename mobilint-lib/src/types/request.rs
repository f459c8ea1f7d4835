use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::report::SharedReport;
use crate::{AnalysisKind, AnalysisMode, AppType, Language, SourceFile};

/// Default maximum number of files fetched per repository
pub const DEFAULT_MAX_FILES: usize = 50;

/// Caller-facing options of a single repository analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisOptions {
    /// Kinds to analyze every file for
    pub analysis_kinds: Vec<AnalysisKind>,
    /// Whether remote backends may augment local results
    pub analysis_mode: AnalysisMode,
    /// Upper bound on the number of files fetched
    pub max_files_per_repo: usize,
    /// Backend to put first in line, regardless of lane assignment
    pub preferred_backend_hint: Option<Backend>,
    /// Free-form options forwarded to remote backends
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            analysis_kinds: AnalysisKind::ALL.to_vec(),
            analysis_mode: AnalysisMode::default(),
            max_files_per_repo: DEFAULT_MAX_FILES,
            preferred_backend_hint: None,
            extra: BTreeMap::new(),
        }
    }
}

/// A single (file, kind) unit of work.
///
/// Requests are immutable. They are handed to the
/// [`DeferredQueue`](crate::DeferredQueue) when no backend can admit them
/// and handed back to the orchestrator when the queue drains.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file: Arc<SourceFile>,
    pub language: Language,
    pub kind: AnalysisKind,
    pub app_type: AppType,
    /// Backend of the lane this request originates from
    pub preferred: Backend,
    pub options: Arc<BTreeMap<String, serde_json::Value>>,
    pub mode: AnalysisMode,
    /// Report the request's findings are written to
    pub report: SharedReport,
    /// Cancelled together with the run that created the request
    pub cancel: CancellationToken,
    pub(crate) enqueued_at: Instant,
}

impl AnalysisRequest {
    /// Create a request without extra options and with its own
    /// cancellation token
    #[must_use]
    pub fn new(
        file: Arc<SourceFile>,
        language: Language,
        kind: AnalysisKind,
        app_type: AppType,
        preferred: Backend,
        mode: AnalysisMode,
        report: SharedReport,
    ) -> Self {
        Self {
            file,
            language,
            kind,
            app_type,
            preferred,
            options: Arc::default(),
            mode,
            report,
            cancel: CancellationToken::new(),
            enqueued_at: Instant::now(),
        }
    }

    /// Time at which the request was created or last enqueued
    #[must_use]
    pub const fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// `true` once the request can no longer contribute to its report
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.mode.is_local_only() || self.cancel.is_cancelled() || self.report.read().is_terminal()
    }
}
