use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::backend::Backend;

/// Number of remote calls whose duration is kept per backend
const RECENT_CALLS: usize = 100;

/// Durations of the most recent remote calls of one backend.
///
/// Holds at most [`RECENT_CALLS`] entries. Once full, each new duration
/// overwrites the oldest one.
#[derive(Debug, Clone, Default)]
pub struct RequestTimes {
    times: Vec<Duration>,
    /// Slot the next duration is written to once the buffer is full
    next: usize,
}

impl RequestTimes {
    pub fn record(&mut self, time: Duration) {
        if self.times.len() < RECENT_CALLS {
            self.times.push(time);
        } else {
            self.times[self.next] = time;
        }
        self.next = (self.next + 1) % RECENT_CALLS;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Median of the kept durations; the mean of the two middle ones for an
    /// even count
    #[must_use]
    pub fn median(&self) -> Option<Duration> {
        if self.times.is_empty() {
            return None;
        }
        let mut times = self.times.clone();
        let mid = times.len() / 2;
        let (lower, &mut upper, _) = times.select_nth_unstable(mid);
        if self.times.len() % 2 == 1 {
            return Some(upper);
        }
        // Even count: the largest of the lower half is the other middle value
        lower.iter().max().map(|&below| (below + upper) / 2)
    }
}

/// A [`HashMap`] mapping backends to their [`BackendStats`]
#[derive(Debug, Default, Serialize)]
pub struct BackendStatsMap(HashMap<Backend, BackendStats>);

impl BackendStatsMap {
    /// Backends sorted by admitted requests, busiest first
    #[must_use]
    pub fn sorted(&self) -> Vec<(Backend, BackendStats)> {
        let mut sorted: Vec<_> = self.0.clone().into_iter().collect();
        sorted.sort_by_key(|(backend, stats)| (std::cmp::Reverse(stats.admitted), *backend));
        sorted
    }

    #[must_use]
    pub fn get(&self, backend: Backend) -> Option<&BackendStats> {
        self.0.get(&backend)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<Backend, BackendStats>> for BackendStatsMap {
    fn from(value: HashMap<Backend, BackendStats>) -> Self {
        Self(value)
    }
}

/// Record and report statistics for one remote backend
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Requests the rate limiter let through
    pub admitted: u64,
    /// Remote calls that returned a usable answer
    pub succeeded: u64,
    /// Remote calls that failed and fell back to local results
    pub failed: u64,
    /// Requests deferred while this backend was the preferred one
    pub deferred: u64,
    /// Durations of the most recent remote calls
    pub request_times: RequestTimes,
}

impl BackendStats {
    pub fn record_admission(&mut self) {
        self.admitted += 1;
    }

    pub fn record_success(&mut self, request_time: Duration) {
        self.succeeded += 1;
        self.request_times.record(request_time);
    }

    pub fn record_failure(&mut self, request_time: Duration) {
        self.failed += 1;
        self.request_times.record(request_time);
    }

    pub fn record_deferral(&mut self) {
        self.deferred += 1;
    }

    /// Get median request time
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        self.request_times.median()
    }

    /// Share of finished remote calls that succeeded (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let finished = self.succeeded + self.failed;
        if finished == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.succeeded as f64 / finished as f64;
            success_rate
        }
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let success_pct = (self.success_rate() * 100.0) as u64;

        let median = self
            .median_request_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));

        format!(
            "{} admitted ({}% success, {} deferred), median: {}",
            self.admitted, success_pct, self.deferred, median
        )
    }
}

impl Serialize for BackendStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let median_request_time_ms = self.median_request_time().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("BackendStats", 6)?;
        s.serialize_field("admitted", &self.admitted)?;
        s.serialize_field("succeeded", &self.succeeded)?;
        s.serialize_field("failed", &self.failed)?;
        s.serialize_field("deferred", &self.deferred)?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("median_request_time_ms", &median_request_time_ms)?;
        s.end()
    }
}
