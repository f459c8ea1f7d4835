//! The mutable aggregate every analysis run writes into.
//!
//! A [`Report`] moves forward through
//! `pending → processing → completed | failed` and never back. Findings can
//! only be added before it reaches a terminal status. During a run the report
//! is shared as a [`SharedReport`]; appending a finding and updating the
//! summary counters happen under one write lock, so readers never observe one
//! without the other.

mod store;
mod summary;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

pub use store::{DEFAULT_REPORT_TTL, InMemoryStore, ReportStore};
pub use summary::{KindCounts, SeverityCounts, Summary};

use crate::{AnalysisKind, AppType, ErrorKind, Finding, Result};

/// A report shared between the orchestrator, the deferred queue and readers
pub type SharedReport = Arc<RwLock<Report>>;

/// Lifecycle of a [`Report`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    /// `true` for `completed` and `failed`
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            ReportStatus::Pending => 0,
            ReportStatus::Processing => 1,
            ReportStatus::Completed | ReportStatus::Failed => 2,
        }
    }
}

/// The error that made a run fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Findings that share a title within one analysis kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingGroup<'a> {
    pub title: &'a str,
    pub instances: Vec<&'a Finding>,
}

/// Aggregated result of analyzing one repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    id: Uuid,
    /// The URL or path the analysis was started for
    pub repo_url: String,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub app_type: AppType,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: ReportStatus,
    summary: Summary,
    findings: BTreeMap<AnalysisKind, Vec<Finding>>,
    error: Option<ReportError>,
}

impl Report {
    /// Create a pending report for the given source
    #[must_use]
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_url: repo_url.into(),
            repo_owner: None,
            repo_name: None,
            app_type: AppType::Unknown,
            created_at: Utc::now(),
            completed_at: None,
            status: ReportStatus::Pending,
            summary: Summary::default(),
            findings: AnalysisKind::ALL
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
            error: None,
        }
    }

    /// Wrap the report for sharing across tasks
    #[must_use]
    pub fn into_shared(self) -> SharedReport {
        Arc::new(RwLock::new(self))
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn status(&self) -> ReportStatus {
        self.status
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub const fn summary(&self) -> &Summary {
        &self.summary
    }

    #[must_use]
    pub const fn error(&self) -> Option<&ReportError> {
        self.error.as_ref()
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Findings of one kind, in insertion order
    #[must_use]
    pub fn findings(&self, kind: AnalysisKind) -> &[Finding] {
        self.findings.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// All findings of all kinds
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.values().flatten()
    }

    /// Move the report to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidStatusTransition`] if `next` is not
    /// strictly ahead of the current status.
    pub fn set_status(&mut self, next: ReportStatus) -> Result<()> {
        if next.rank() <= self.status.rank() {
            return Err(ErrorKind::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the report as failed with the given error.
    ///
    /// Has no effect on a report that already reached a terminal status.
    pub fn fail(&mut self, error: &ErrorKind) {
        if self.set_status(ReportStatus::Failed).is_ok() {
            self.error = Some(ReportError {
                message: error.to_string(),
                time: Utc::now(),
            });
        }
    }

    /// Append a finding and update the summary counters.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ReportClosed`] once the report is completed or
    /// failed.
    pub fn add_finding(&mut self, kind: AnalysisKind, finding: Finding) -> Result<()> {
        if self.is_terminal() {
            return Err(ErrorKind::ReportClosed {
                id: self.id,
                status: self.status,
            });
        }
        self.summary.record(kind, &finding);
        self.findings.entry(kind).or_default().push(finding);
        Ok(())
    }

    /// Findings of one kind ordered for display: issues before
    /// recommendations, then by descending severity, then by title.
    /// "No issues" notes go last.
    #[must_use]
    pub fn sorted(&self, kind: AnalysisKind) -> Vec<&Finding> {
        let mut sorted: Vec<_> = self.findings(kind).iter().collect();
        sorted.sort_by(|a, b| {
            a.is_no_issues()
                .cmp(&b.is_no_issues())
                .then(a.kind.cmp(&b.kind))
                .then(b.severity.cmp(&a.severity))
                .then(a.title.cmp(&b.title))
        });
        sorted
    }

    /// Findings of one kind grouped by title, in display order
    #[must_use]
    pub fn grouped(&self, kind: AnalysisKind) -> Vec<FindingGroup<'_>> {
        let mut groups: Vec<FindingGroup<'_>> = Vec::new();
        for finding in self.sorted(kind) {
            match groups.iter_mut().find(|g| g.title == finding.title) {
                Some(group) => group.instances.push(finding),
                None => groups.push(FindingGroup {
                    title: &finding.title,
                    instances: vec![finding],
                }),
            }
        }
        groups
    }
}
