//! Requests that found no admissible backend.
//!
//! The [`DeferredQueue`] keeps such requests and replays them once a
//! backend has capacity again. Draining is single-flight: a drain that
//! starts while another one is running returns
//! [`DrainOutcome::AlreadyRunning`] immediately instead of waiting.
//!
//! Entries stay in the queue while they are being processed, so a drain
//! that is dropped half-way loses nothing.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::Backend;
use crate::ratelimit::Selector;
use crate::utils::sleep_unless_cancelled;
use crate::{AnalysisRequest, Result};

const fn default_success_delay() -> Duration {
    Duration::from_secs(2)
}

const fn default_failure_cooldown() -> Duration {
    Duration::from_secs(3)
}

const fn default_unavailable_cooldown() -> Duration {
    Duration::from_secs(5)
}

const fn default_pass_interval() -> Duration {
    Duration::from_secs(10)
}

const fn default_max_passes() -> usize {
    3
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_max_age() -> Duration {
    Duration::from_secs(10 * 60)
}

/// Pacing and retry policy of the deferred queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrainConfig {
    /// Pause after a successfully replayed entry
    #[serde(with = "humantime_serde")]
    pub success_delay: Duration,

    /// Pause after a replay that failed
    #[serde(with = "humantime_serde")]
    pub failure_cooldown: Duration,

    /// Pause after an entry no backend could admit
    #[serde(with = "humantime_serde")]
    pub unavailable_cooldown: Duration,

    /// Pause between two passes over the queue
    #[serde(with = "humantime_serde")]
    pub pass_interval: Duration,

    /// Passes run at the end of an analysis
    pub max_passes: usize,

    /// Entries are evicted after this many unsuccessful attempts
    pub max_attempts: u32,

    /// Entries are evicted once they waited this long
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            success_delay: default_success_delay(),
            failure_cooldown: default_failure_cooldown(),
            unavailable_cooldown: default_unavailable_cooldown(),
            pass_interval: default_pass_interval(),
            max_passes: default_max_passes(),
            max_attempts: default_max_attempts(),
            max_age: default_max_age(),
        }
    }
}

/// What happened to the entries of one or more drain passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    /// Replayed successfully and removed
    pub processed: usize,
    /// Replayed, but the backend failed; kept
    pub failed: usize,
    /// No backend had capacity; kept
    pub unavailable: usize,
    /// Removed because their run is local-only, cancelled or finished
    pub dropped: usize,
    /// Removed because they were retried too often or waited too long
    pub evicted: usize,
    /// Entries left in the queue afterwards
    pub remaining: usize,
}

impl DrainSummary {
    fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.unavailable += other.unavailable;
        self.dropped += other.dropped;
        self.evicted += other.evicted;
        self.remaining = other.remaining;
    }
}

/// Result of [`DeferredQueue::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The pass ran to completion (or until cancelled)
    Completed(DrainSummary),
    /// Another drain was in progress; nothing was done
    AlreadyRunning,
}

/// Executes a deferred request once a backend admitted it
#[async_trait]
pub trait Replay: Send + Sync {
    /// Analyze `request` on `backend`, whose quota was already charged.
    ///
    /// # Errors
    ///
    /// Fails if the backend call fails. The entry is then kept for a later
    /// pass.
    async fn replay(&self, request: &AnalysisRequest, backend: Backend) -> Result<()>;
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    request: AnalysisRequest,
    attempts: u32,
}

#[derive(Debug, Default)]
struct Entries {
    entries: Vec<Entry>,
    next_seq: u64,
}

enum Step {
    Drop,
    Evict,
    Unavailable,
    Replay(Backend),
}

/// FIFO of deferred [`AnalysisRequest`]s, shared by all runs of an
/// orchestrator
#[derive(Debug)]
pub struct DeferredQueue {
    entries: Mutex<Entries>,
    selector: Selector,
    config: DrainConfig,
    drain_lock: tokio::sync::Mutex<()>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new(selector: Selector, config: DrainConfig) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            selector,
            config,
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// Append `request`, stamped with the current time.
    ///
    /// Local-only requests are never deferred; for those this returns
    /// `false` and does nothing.
    pub fn enqueue(&self, mut request: AnalysisRequest) -> bool {
        if request.mode.is_local_only() {
            log::debug!("Not deferring local-only request for {}", request.file.path);
            return false;
        }
        request.enqueued_at = Instant::now();
        log::info!(
            "Deferring {} analysis of {} (preferred: {})",
            request.kind,
            request.file.path,
            request.preferred
        );
        let mut entries = self.entries.lock();
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.entries.push(Entry {
            seq,
            request,
            attempts: 0,
        });
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries belonging to the report with `id`
    #[must_use]
    pub fn len_for(&self, id: Uuid) -> usize {
        self.entries
            .lock()
            .entries
            .iter()
            .filter(|e| e.request.report.read().id() == id)
            .count()
    }

    /// Run one pass over the queue, oldest entry first.
    ///
    /// Each entry is dropped if its run no longer wants it, evicted if the
    /// retry policy says so, replayed if a backend admits it, or kept
    /// otherwise. Entries enqueued during the pass wait for the next one.
    pub async fn drain(&self, replay: &dyn Replay, cancel: &CancellationToken) -> DrainOutcome {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            log::debug!("Drain already in progress");
            return DrainOutcome::AlreadyRunning;
        };

        let mut order: Vec<(Instant, u64)> = self
            .entries
            .lock()
            .entries
            .iter()
            .map(|e| (e.request.enqueued_at, e.seq))
            .collect();
        order.sort_unstable();

        let mut summary = DrainSummary::default();
        if !order.is_empty() {
            log::info!("Draining {} deferred requests", order.len());
        }

        for (_, seq) in order {
            if cancel.is_cancelled() {
                break;
            }
            let Some((request, step)) = self.next_step(seq) else {
                continue;
            };

            let pause = match step {
                Step::Drop => {
                    self.remove(seq);
                    summary.dropped += 1;
                    continue;
                }
                Step::Evict => {
                    log::warn!(
                        "Giving up on {} analysis of {}",
                        request.kind,
                        request.file.path
                    );
                    self.remove(seq);
                    summary.evicted += 1;
                    continue;
                }
                Step::Unavailable => {
                    self.bump(seq);
                    summary.unavailable += 1;
                    self.config.unavailable_cooldown
                }
                Step::Replay(backend) => match replay.replay(&request, backend).await {
                    Ok(()) => {
                        self.remove(seq);
                        summary.processed += 1;
                        self.config.success_delay
                    }
                    Err(e) => {
                        log::warn!("Deferred analysis of {} failed: {e}", request.file.path);
                        self.bump(seq);
                        summary.failed += 1;
                        self.config.failure_cooldown
                    }
                },
            };
            if !sleep_unless_cancelled(pause, cancel).await {
                break;
            }
        }

        summary.remaining = self.len();
        log::debug!("Drain pass finished: {summary:?}");
        DrainOutcome::Completed(summary)
    }

    /// Run up to `max_passes` drain passes, `pass_interval` apart, until no
    /// entry of the report with `id` is left or `cancel` fires.
    ///
    /// Entries of other reports are replayed along the way, but never keep
    /// the passes going. `remaining` in the result counts the entries of
    /// the report with `id` only.
    pub async fn run_passes(
        &self,
        replay: &dyn Replay,
        id: Uuid,
        max_passes: usize,
        cancel: &CancellationToken,
    ) -> DrainSummary {
        let mut total = DrainSummary::default();
        for pass in 1..=max_passes {
            if let DrainOutcome::Completed(summary) = self.drain(replay, cancel).await {
                total.merge(summary);
            }
            total.remaining = self.len_for(id);
            if total.remaining == 0 || pass == max_passes {
                break;
            }
            log::info!(
                "{} deferred requests left, next pass in {:?}",
                total.remaining,
                self.config.pass_interval
            );
            if !sleep_unless_cancelled(self.config.pass_interval, cancel).await {
                break;
            }
        }
        total
    }

    /// Decide what to do with entry `seq`. Admission happens here, so a
    /// returned [`Step::Replay`] has already been charged to the backend.
    fn next_step(&self, seq: u64) -> Option<(AnalysisRequest, Step)> {
        let entries = self.entries.lock();
        let entry = entries.entries.iter().find(|e| e.seq == seq)?;
        let request = entry.request.clone();

        let step = if request.is_stale() {
            Step::Drop
        } else if entry.attempts >= self.config.max_attempts
            || request.enqueued_at.elapsed() >= self.config.max_age
        {
            Step::Evict
        } else {
            match self
                .selector
                .acquire(request.preferred, self.selector.candidates())
            {
                Some(backend) => Step::Replay(backend),
                None => Step::Unavailable,
            }
        };
        Some((request, step))
    }

    fn remove(&self, seq: u64) {
        self.entries.lock().entries.retain(|e| e.seq != seq);
    }

    fn bump(&self, seq: u64) {
        if let Some(entry) = self
            .entries
            .lock()
            .entries
            .iter_mut()
            .find(|e| e.seq == seq)
        {
            entry.attempts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{QuotaConfig, RateLimiter};
    use crate::report::{Report, ReportStatus, SharedReport};
    use crate::test_utils::request;
    use crate::{AnalysisKind, AnalysisMode, ErrorKind};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    const WINDOW: Duration = Duration::from_secs(60);

    /// Records replayed paths, failing while `fail` is set
    #[derive(Default)]
    struct Recorder {
        replayed: Mutex<Vec<(String, Backend)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Replay for Recorder {
        async fn replay(&self, request: &AnalysisRequest, backend: Backend) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ErrorKind::Cancelled);
            }
            self.replayed
                .lock()
                .push((request.file.path.clone(), backend));
            Ok(())
        }
    }

    impl Recorder {
        fn paths(&self) -> Vec<String> {
            self.replayed.lock().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    fn queue(capacity: usize, config: DrainConfig) -> (Arc<RateLimiter>, DeferredQueue) {
        let limiter = Arc::new(RateLimiter::new([
            (Backend::OpenAi, QuotaConfig::new(capacity, WINDOW)),
            (Backend::Llama, QuotaConfig::new(capacity, WINDOW)),
        ]));
        let queue = DeferredQueue::new(Selector::new(limiter.clone()), config);
        (limiter, queue)
    }

    fn report() -> SharedReport {
        Report::new("https://github.com/octo/app").into_shared()
    }

    fn remote(path: &str, report: &SharedReport) -> AnalysisRequest {
        request(path, AnalysisKind::Security, AnalysisMode::LocalRemote, report)
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_only_requests_are_rejected() {
        let (_, queue) = queue(1, DrainConfig::default());
        let report = report();
        let accepted = queue.enqueue(request(
            "a.kt",
            AnalysisKind::Memory,
            AnalysisMode::Local,
            &report,
        ));
        assert!(!accepted);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_in_enqueue_order() {
        let (_, queue) = queue(10, DrainConfig::default());
        let report = report();
        for path in ["1.kt", "2.kt", "3.kt"] {
            assert!(queue.enqueue(remote(path, &report)));
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        assert_eq!(queue.len_for(report.read().id()), 3);

        let recorder = Recorder::default();
        let outcome = queue.drain(&recorder, &CancellationToken::new()).await;

        assert_eq!(recorder.paths(), vec!["1.kt", "2.kt", "3.kt"]);
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainSummary {
                processed: 3,
                ..DrainSummary::default()
            })
        );
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preferred_backend_is_tried_first() {
        let (limiter, queue) = queue(1, DrainConfig::default());
        let report = report();
        let mut request = remote("a.kt", &report);
        request.preferred = Backend::Llama;
        queue.enqueue(request);
        let _ = limiter.try_acquire(Backend::OpenAi);

        let recorder = Recorder::default();
        queue.drain(&recorder, &CancellationToken::new()).await;
        assert_eq!(
            *recorder.replayed.lock(),
            vec![("a.kt".to_string(), Backend::Llama)]
        );
        assert_eq!(limiter.snapshot(Backend::Llama).unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_and_failed_entries_are_kept() {
        let (limiter, queue) = queue(1, DrainConfig::default());
        let report = report();
        queue.enqueue(remote("a.kt", &report));
        queue.enqueue(remote("b.kt", &report));
        queue.enqueue(remote("c.kt", &report));

        let recorder = Recorder::default();
        recorder.fail.store(true, Ordering::SeqCst);
        let start = Instant::now();
        let outcome = queue.drain(&recorder, &CancellationToken::new()).await;

        // Two admissions fail, then both quotas are spent
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainSummary {
                failed: 2,
                unavailable: 1,
                remaining: 3,
                ..DrainSummary::default()
            })
        );
        assert_eq!(start.elapsed(), Duration::from_secs(3 + 3 + 5));
        assert!(!limiter.is_available(Backend::OpenAi));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_are_dropped() {
        let (_, queue) = queue(10, DrainConfig::default());
        let finished = report();
        let cancelled = report();
        queue.enqueue(remote("done.kt", &finished));
        let mut request = remote("cancelled.kt", &cancelled);
        let cancel = CancellationToken::new();
        request.cancel = cancel.clone();
        queue.enqueue(request);

        finished
            .write()
            .set_status(ReportStatus::Processing)
            .unwrap();
        finished.write().set_status(ReportStatus::Completed).unwrap();
        cancel.cancel();

        let recorder = Recorder::default();
        let outcome = queue.drain(&recorder, &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainSummary {
                dropped: 2,
                ..DrainSummary::default()
            })
        );
        assert!(recorder.paths().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_max_attempts() {
        let config = DrainConfig {
            max_attempts: 2,
            ..DrainConfig::default()
        };
        let (limiter, queue) = queue(1, config);
        let _ = limiter.try_acquire(Backend::OpenAi);
        let _ = limiter.try_acquire(Backend::Llama);
        let report = report();
        queue.enqueue(remote("a.kt", &report));

        let recorder = Recorder::default();
        let summary = queue
            .run_passes(&recorder, report.read().id(), 5, &CancellationToken::new())
            .await;
        assert_eq!(summary.unavailable, 2);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_max_age() {
        let (_, queue) = queue(1, DrainConfig::default());
        let report = report();
        queue.enqueue(remote("a.kt", &report));
        tokio::time::advance(Duration::from_secs(10 * 60)).await;

        let recorder = Recorder::default();
        let outcome = queue.drain(&recorder, &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainSummary {
                evicted: 1,
                ..DrainSummary::default()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_drain_is_rejected() {
        let (_, queue) = queue(10, DrainConfig::default());
        let report = report();
        queue.enqueue(remote("a.kt", &report));
        let queue = Arc::new(queue);

        let recorder = Arc::new(Recorder::default());
        let first = {
            let queue = queue.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move {
                queue
                    .drain(recorder.as_ref(), &CancellationToken::new())
                    .await
            })
        };
        // Let the first drain reach its success delay
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = queue.drain(recorder.as_ref(), &CancellationToken::new()).await;
        assert_eq!(second, DrainOutcome::AlreadyRunning);
        assert!(matches!(
            first.await.unwrap(),
            DrainOutcome::Completed(DrainSummary { processed: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_wait_for_the_window() {
        let config = DrainConfig {
            pass_interval: Duration::from_secs(30),
            ..DrainConfig::default()
        };
        let (limiter, queue) = queue(1, config);
        let report = report();
        let _ = limiter.try_acquire(Backend::OpenAi);
        let _ = limiter.try_acquire(Backend::Llama);
        queue.enqueue(remote("a.kt", &report));

        let recorder = Recorder::default();
        let summary = queue
            .run_passes(&recorder, report.read().id(), 10, &CancellationToken::new())
            .await;

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.remaining, 0);
        assert!(summary.unavailable >= 1);
        assert_eq!(recorder.paths(), vec!["a.kt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_drain_keeps_entries() {
        let (_, queue) = queue(1, DrainConfig::default());
        let report = report();
        queue.enqueue(remote("a.kt", &report));
        queue.enqueue(remote("b.kt", &report));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let recorder = Recorder::default();
        let summary = queue
            .run_passes(&recorder, report.read().id(), 3, &cancel)
            .await;
        assert_eq!(summary.remaining, 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_stop_when_own_entries_are_done() {
        let (limiter, queue) = queue(1, DrainConfig::default());
        let _ = limiter.try_acquire(Backend::Llama);
        let ours = report();
        let theirs = report();
        queue.enqueue(remote("ours.kt", &ours));
        tokio::time::advance(Duration::from_millis(1)).await;
        queue.enqueue(remote("theirs.kt", &theirs));

        let recorder = Recorder::default();
        let start = Instant::now();
        let summary = queue
            .run_passes(&recorder, ours.read().id(), 3, &CancellationToken::new())
            .await;

        // One pass: success delay, then the cooldown of the other report's entry
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 5));
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.remaining, 0);
        assert_eq!(recorder.paths(), vec!["ours.kt"]);
        assert_eq!(queue.len_for(theirs.read().id()), 1);
    }
}
