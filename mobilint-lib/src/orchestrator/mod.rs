//! Driver of repository analyses.
//!
//! This module defines two structs, [`Orchestrator`] and
//! [`OrchestratorBuilder`]. `Orchestrator` fetches a repository, spreads its
//! files over one lane per backend and analyzes every file for every
//! requested kind. `OrchestratorBuilder` exposes a finer level of
//! granularity for building an `Orchestrator`.
#![allow(clippy::module_name_repetitions)]

mod analyzer;

use std::sync::Arc;
use std::time::Duration;

use futures::{TryStreamExt, stream};
use secrecy::SecretString;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::backend::{Backend, BackendRegistry};
use crate::classify::{Lane, categorize, detect_app_type, distribute, should_analyze_file};
use crate::deferred::{DeferredQueue, DrainConfig, DrainOutcome};
use crate::detector::Detectors;
use crate::fetch::{Fetcher, GitHubFetcher, LocalFetcher, RepositoryFetcher, RepositorySource};
use crate::ratelimit::{BackendStatsMap, RateLimiter, Selector};
use crate::report::{InMemoryStore, Report, ReportStatus, ReportStore, SharedReport};
use crate::{AnalysisKind, AnalysisMode, AnalysisOptions, AppType, ErrorKind, Result};

/// Default pause between two analyses on the same lane, 1 second.
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_secs(1);
/// Default interval of the background drain while lanes run, 3 seconds.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(3);
/// Default number of lanes processed at the same time, 1.
pub const DEFAULT_LANE_CONCURRENCY: usize = 1;

/// Builder for [`Orchestrator`].
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
pub struct OrchestratorBuilder {
    /// Remote backends that may augment local results.
    ///
    /// With an empty registry every run is local-only.
    registry: BackendRegistry,

    /// Local detectors, one per analysis kind
    #[builder(default_code = "Detectors::builtin()")]
    detectors: Detectors,

    /// Where repository files come from.
    ///
    /// Defaults to a fetcher that reads GitHub repositories through the
    /// GitHub API and local directories from disk.
    #[builder(setter(!into, strip_option))]
    fetcher: Option<Arc<dyn RepositoryFetcher>>,

    /// Optional GitHub token for the default fetcher.
    ///
    /// ## Rate-limiting Defaults
    ///
    /// Unauthenticated clients get 60 API requests per hour, which is
    /// rarely enough for more than a handful of files.
    github_token: Option<SecretString>,

    /// Report storage. Defaults to an [`InMemoryStore`].
    #[builder(setter(!into, strip_option))]
    store: Option<Arc<dyn ReportStore>>,

    /// Backends files are distributed over, one lane each.
    ///
    /// Backends missing from the registry are left out. If none of them is
    /// registered, the lanes are kept as given and every request is
    /// deferred or analyzed locally.
    #[builder(default_code = "Backend::LANES.to_vec()")]
    lanes: Vec<Backend>,

    /// Pause between two successive analyses on one lane
    #[builder(default = DEFAULT_POLITENESS_DELAY)]
    politeness_delay: Duration,

    /// Maximum number of lanes processed at the same time
    #[builder(default = DEFAULT_LANE_CONCURRENCY)]
    lane_concurrency: usize,

    /// How often the deferred queue is drained while lanes are running.
    ///
    /// Zero disables the background drain. Deferred requests are then
    /// only replayed once all lanes are done.
    #[builder(default = DEFAULT_DRAIN_INTERVAL)]
    drain_interval: Duration,

    /// Delays and retry policy of the deferred queue
    drain: DrainConfig,
}

impl Default for OrchestratorBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OrchestratorBuilder {
    /// Instantiates an [`Orchestrator`].
    ///
    /// # Errors
    ///
    /// Returns an error if the default fetcher cannot create its HTTP
    /// client, e.g. because the GitHub token is not a valid header value.
    pub fn orchestrator(self) -> Result<Orchestrator> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(Fetcher::new(
                GitHubFetcher::new(self.github_token.as_ref())?,
                LocalFetcher::default(),
            )),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::default()));

        let limiter = Arc::new(self.registry.rate_limiter());
        let selector = Selector::new(Arc::clone(&limiter));
        let queue = DeferredQueue::new(selector.clone(), self.drain);

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                registry: self.registry,
                detectors: self.detectors,
                fetcher,
                store,
                limiter,
                selector,
                queue,
                lanes: self.lanes,
                politeness_delay: self.politeness_delay,
                lane_concurrency: self.lane_concurrency.max(1),
                drain_interval: self.drain_interval,
            }),
        })
    }
}

/// Runs repository analyses.
///
/// Cloning is cheap. All clones share the same rate limiter, deferred queue
/// and report store, so quotas hold across concurrent runs.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: BackendRegistry,
    detectors: Detectors,
    fetcher: Arc<dyn RepositoryFetcher>,
    store: Arc<dyn ReportStore>,
    limiter: Arc<RateLimiter>,
    selector: Selector,
    queue: DeferredQueue,
    lanes: Vec<Backend>,
    politeness_delay: Duration,
    lane_concurrency: usize,
    drain_interval: Duration,
}

/// Everything the lanes of one run share
#[derive(Debug)]
struct Run {
    report: SharedReport,
    kinds: Vec<AnalysisKind>,
    mode: AnalysisMode,
    app_type: AppType,
    preferred: Option<Backend>,
    options: Arc<std::collections::BTreeMap<String, serde_json::Value>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// An orchestrator with default settings and no remote backends
    ///
    /// # Errors
    ///
    /// See [`OrchestratorBuilder::orchestrator`].
    pub fn local() -> Result<Self> {
        OrchestratorBuilder::default().orchestrator()
    }

    /// Analyze the repository at `source_url` and return its report.
    ///
    /// The report is put into the store before any work starts, so it can
    /// be polled with [`Orchestrator::get_report`] while the run is in
    /// flight. The run never returns an error: fetch and classification
    /// faults as well as cancellation mark the report as failed instead.
    pub async fn analyze_repository(
        &self,
        source_url: &str,
        options: AnalysisOptions,
        cancel: CancellationToken,
    ) -> SharedReport {
        let report = Report::new(source_url).into_shared();
        self.inner.store.put(Arc::clone(&report));
        if let Err(e) = report.write().set_status(ReportStatus::Processing) {
            log::warn!("{e}");
        }

        let id = report.read().id();
        log::info!("Starting analysis {id} of {source_url}");
        match self.inner.run(source_url, options, &report, cancel).await {
            Ok(()) => {
                let mut report = report.write();
                if let Err(e) = report.set_status(ReportStatus::Completed) {
                    log::warn!("{e}");
                }
                log::info!(
                    "Analysis {id} completed with {} findings",
                    report.summary().total()
                );
            }
            Err(e) => {
                log::error!("Analysis {id} of {source_url} failed: {e}");
                if let Some(details) = e.details() {
                    log::warn!("{details}");
                }
                report.write().fail(&e);
            }
        }
        report
    }

    /// Analyze one file for one kind.
    ///
    /// Returns the local findings, followed by the remote findings if a
    /// backend admitted the request and answered. Both are also appended to
    /// the request's report.
    pub async fn analyze_file(&self, request: crate::AnalysisRequest) -> Vec<crate::Finding> {
        self.inner.analyze_file(request).await
    }

    /// Look up a report of this or an earlier run
    #[must_use]
    pub fn get_report(&self, id: &Uuid) -> Option<SharedReport> {
        self.inner.store.get(id)
    }

    /// Per-backend request statistics since this orchestrator was built
    #[must_use]
    pub fn backend_stats(&self) -> BackendStatsMap {
        self.inner.limiter.stats()
    }

    /// The queue of requests waiting for a backend
    #[must_use]
    pub fn deferred(&self) -> &DeferredQueue {
        &self.inner.queue
    }

    /// Run one pass over the deferred queue
    pub async fn drain(&self, cancel: &CancellationToken) -> DrainOutcome {
        self.inner.queue.drain(self.inner.as_ref(), cancel).await
    }
}

impl Inner {
    async fn run(
        &self,
        source_url: &str,
        options: AnalysisOptions,
        report: &SharedReport,
        cancel: CancellationToken,
    ) -> Result<()> {
        let source = RepositorySource::parse(source_url)?;
        {
            let mut report = report.write();
            report.repo_owner = source.owner().map(ToOwned::to_owned);
            report.repo_name = source.name().map(ToOwned::to_owned);
        }

        let files = tokio::select! {
            () = cancel.cancelled() => return Err(ErrorKind::Cancelled),
            files = self.fetcher.get_all_files(&source, AppType::Unknown, options.max_files_per_repo) => files?,
        };
        log::info!("Fetched {} files from {source}", files.len());

        let app_type = detect_app_type(&files);
        report.write().app_type = app_type;
        log::info!("Detected app type: {app_type}");

        let files: Vec<_> = files
            .into_iter()
            .filter(|file| should_analyze_file(&file.path, app_type))
            .map(Arc::new)
            .collect();
        if files.is_empty() {
            return Err(ErrorKind::EmptyRepository(source.to_string()));
        }

        let lanes = distribute(categorize(files), &self.lane_backends());
        let run = Run {
            report: Arc::clone(report),
            kinds: dedup(options.analysis_kinds),
            mode: self.effective_mode(options.analysis_mode),
            app_type,
            preferred: options.preferred_backend_hint,
            options: Arc::new(options.extra),
            cancel,
        };

        self.process_lanes(&lanes, &run).await?;
        if run.cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }

        let id = report.read().id();
        let pending = self.queue.len_for(id);
        if !run.mode.is_local_only() && pending > 0 {
            log::info!("Replaying {pending} deferred requests");
            let summary = self
                .queue
                .run_passes(self, id, self.queue.config().max_passes, &run.cancel)
                .await;
            log::info!("Deferred queue drained: {summary:?}");
            if run.cancel.is_cancelled() {
                return Err(ErrorKind::Cancelled);
            }
        }
        Ok(())
    }

    /// Process every lane, draining the deferred queue in the background
    /// while remote analysis is enabled
    async fn process_lanes(&self, lanes: &[Lane], run: &Run) -> Result<()> {
        let lanes_done = stream::iter(lanes.iter().map(Ok))
            .try_for_each_concurrent(self.lane_concurrency, |lane| self.process_lane(lane, run));
        if run.mode.is_local_only() || self.drain_interval.is_zero() {
            return lanes_done.await;
        }

        let mut ticker = interval_at(Instant::now() + self.drain_interval, self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let background_drain = async {
            loop {
                ticker.tick().await;
                if let DrainOutcome::Completed(summary) = self.queue.drain(self, &run.cancel).await
                {
                    log::debug!("Background drain: {summary:?}");
                }
            }
        };

        tokio::select! {
            result = lanes_done => result,
            _ = background_drain => Ok(()),
        }
    }

    /// Analyze the files of one lane, strictly one after the other
    async fn process_lane(&self, lane: &Lane, run: &Run) -> Result<()> {
        log::debug!("Lane {} has {} files", lane.backend, lane.files.len());
        let preferred = run.preferred.unwrap_or(lane.backend);
        let mut first = true;
        for (file, language) in lane.analyzable() {
            for &kind in &run.kinds {
                if !first
                    && !run.mode.is_local_only()
                    && !crate::utils::sleep_unless_cancelled(self.politeness_delay, &run.cancel)
                        .await
                {
                    return Err(ErrorKind::Cancelled);
                }
                first = false;
                if run.cancel.is_cancelled() {
                    return Err(ErrorKind::Cancelled);
                }

                let mut request = crate::AnalysisRequest::new(
                    Arc::clone(file),
                    language,
                    kind,
                    run.app_type,
                    preferred,
                    run.mode,
                    Arc::clone(&run.report),
                );
                request.options = Arc::clone(&run.options);
                request.cancel = run.cancel.clone();
                let findings = self.analyze_file(request).await;
                log::debug!("{} ({kind}): {} findings", file.path, findings.len());
            }
        }
        Ok(())
    }

    /// Registered lane backends, or all configured ones if none is registered
    fn lane_backends(&self) -> Vec<Backend> {
        let registered: Vec<_> = self
            .lanes
            .iter()
            .copied()
            .filter(|&backend| self.registry.contains(backend))
            .collect();
        if registered.is_empty() {
            self.lanes.clone()
        } else {
            registered
        }
    }

    fn effective_mode(&self, requested: AnalysisMode) -> AnalysisMode {
        if !requested.is_local_only() && self.registry.is_empty() {
            log::warn!("No remote backend is configured, falling back to local analysis");
            return AnalysisMode::Local;
        }
        requested
    }
}

/// Drop repeated kinds, keeping the first occurrence
fn dedup(kinds: Vec<AnalysisKind>) -> Vec<AnalysisKind> {
    let mut unique = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if !unique.contains(&kind) {
            unique.push(kind);
        }
    }
    unique
}
