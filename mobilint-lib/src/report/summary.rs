use serde::{Deserialize, Serialize};

use crate::{AnalysisKind, Finding, FindingKind, Severity};

/// Finding counts per severity, kept for the `security` kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub total: usize,
}

impl SeverityCounts {
    fn record(&mut self, severity: Severity) {
        let counter = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        };
        *counter += 1;
        self.total += 1;
    }

    /// Count for a single severity level
    #[must_use]
    pub const fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Issue and recommendation counts, kept for every kind except `security`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub issues: usize,
    pub recommendations: usize,
}

impl KindCounts {
    fn record(&mut self, kind: FindingKind) {
        match kind {
            FindingKind::Issue => self.issues += 1,
            FindingKind::Recommendation => self.recommendations += 1,
        }
    }
}

/// Counters derived from the findings of a [`Report`](super::Report)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub security: SeverityCounts,
    pub performance: KindCounts,
    pub memory: KindCounts,
    pub battery: KindCounts,
}

impl Summary {
    /// Account for one more finding of the given kind
    pub(crate) fn record(&mut self, kind: AnalysisKind, finding: &Finding) {
        match kind {
            AnalysisKind::Security => self.security.record(finding.severity),
            AnalysisKind::Performance => self.performance.record(finding.kind),
            AnalysisKind::Memory => self.memory.record(finding.kind),
            AnalysisKind::Battery => self.battery.record(finding.kind),
        }
    }

    /// Issue/recommendation counts of a non-security kind
    #[must_use]
    pub const fn counts(&self, kind: AnalysisKind) -> Option<KindCounts> {
        match kind {
            AnalysisKind::Security => None,
            AnalysisKind::Performance => Some(self.performance),
            AnalysisKind::Memory => Some(self.memory),
            AnalysisKind::Battery => Some(self.battery),
        }
    }

    /// Total number of findings across all kinds
    #[must_use]
    pub fn total(&self) -> usize {
        self.security.total
            + [self.performance, self.memory, self.battery]
                .iter()
                .map(|c| c.issues + c.recommendations)
                .sum::<usize>()
    }
}
