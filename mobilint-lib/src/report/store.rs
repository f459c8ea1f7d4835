use std::fmt::Debug;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use super::SharedReport;

/// How long a finished report stays retrievable by default
pub const DEFAULT_REPORT_TTL: Duration = Duration::from_secs(60 * 60);

/// Storage for reports, keyed by report id.
///
/// The orchestrator puts every report it creates into its store, so a caller
/// can poll a run's progress with [`get`](ReportStore::get) while it is in
/// flight.
pub trait ReportStore: Send + Sync + Debug {
    /// Insert or replace a report
    fn put(&self, report: SharedReport);

    /// Fetch a report, if present and not expired
    fn get(&self, id: &Uuid) -> Option<SharedReport>;

    /// Remove a report, returning it if it was present
    fn delete(&self, id: &Uuid) -> Option<SharedReport>;

    /// Drop every expired report and return how many were dropped
    fn evict_expired(&self) -> usize;

    /// Number of stored reports, expired ones included
    fn len(&self) -> usize;

    /// `true` if the store holds no reports
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Entry {
    report: SharedReport,
    stored_at: Instant,
}

/// A [`ReportStore`] that keeps reports in memory for a fixed time to live.
///
/// Reports that are still running never expire.
#[derive(Debug)]
pub struct InMemoryStore {
    reports: DashMap<Uuid, Entry>,
    ttl: Duration,
}

impl InMemoryStore {
    /// Create a store whose entries expire `ttl` after they were stored
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            reports: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.report.read().is_terminal() && entry.stored_at.elapsed() > self.ttl
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_TTL)
    }
}

impl ReportStore for InMemoryStore {
    fn put(&self, report: SharedReport) {
        let id = report.read().id();
        self.reports.insert(
            id,
            Entry {
                report,
                stored_at: Instant::now(),
            },
        );
    }

    fn get(&self, id: &Uuid) -> Option<SharedReport> {
        let entry = self.reports.get(id)?;
        if self.is_expired(&entry) {
            drop(entry);
            self.reports.remove(id);
            return None;
        }
        Some(entry.report.clone())
    }

    fn delete(&self, id: &Uuid) -> Option<SharedReport> {
        self.reports.remove(id).map(|(_, entry)| entry.report)
    }

    fn evict_expired(&self) -> usize {
        let before = self.reports.len();
        self.reports.retain(|_, entry| !self.is_expired(entry));
        before - self.reports.len()
    }

    fn len(&self) -> usize {
        self.reports.len()
    }
}
