use anyhow::Result;
use std::fmt::{self, Display};

use mobilint_lib::{AnalysisKind, Report, ReportStatus};

use super::{ReportFormatter, kind_counts, location};
use crate::formatters::color::{
    BOLD_GREEN, BOLD_PINK, BOLD_YELLOW, DIM, NORMAL, color, color_for_severity,
};

struct CompactReport<'a>(&'a Report);

impl Display for CompactReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;

        let name = match (&report.repo_owner, &report.repo_name) {
            (Some(owner), Some(name)) => format!("{owner}/{name}"),
            _ => report.repo_url.clone(),
        };
        color!(f, BOLD_YELLOW, "[{}]", name)?;
        color!(f, DIM, " {} app\n\n", report.app_type)?;

        if let Some(error) = report.error() {
            color!(f, BOLD_PINK, "Analysis failed: {}\n\n", error.message)?;
        }

        for kind in AnalysisKind::ALL {
            // Clean files are only counted, not listed
            let groups: Vec<_> = report
                .grouped(kind)
                .into_iter()
                .filter(|group| !group.instances.iter().all(|f| f.is_no_issues()))
                .collect();
            if groups.is_empty() {
                continue;
            }

            color!(f, NORMAL, "{}", kind.to_string().to_uppercase())?;
            color!(f, DIM, " ({})\n", kind_counts(report, kind))?;
            for group in groups {
                let first = group.instances[0];
                let style = color_for_severity(first.severity);
                color!(f, style, "  [{}]", first.severity)?;
                write!(f, " {}", group.title)?;
                if group.instances.len() > 1 {
                    color!(f, DIM, " ({} instances)", group.instances.len())?;
                }
                writeln!(f)?;
                for finding in &group.instances {
                    color!(f, DIM, "    {} via {}\n", location(finding), finding.source)?;
                }
                if !first.recommendation.is_empty() {
                    writeln!(f, "    -> {}", first.recommendation)?;
                }
            }
            writeln!(f)?;
        }

        color!(f, NORMAL, "🔍 {} Findings", report.summary().total())?;

        // show duration (in a human readable format), e.g. 2m 30s
        if let Some(duration) = report
            .completed_at()
            .and_then(|end| (end - report.created_at()).to_std().ok())
        {
            let secs = std::time::Duration::from_secs(duration.as_secs());
            color!(f, DIM, " (in {})", humantime::format_duration(secs))?;
        }

        match report.status() {
            ReportStatus::Failed => color!(f, BOLD_PINK, " 🚫 {}", report.status())?,
            status => color!(f, BOLD_GREEN, " ✅ {}", status)?,
        }
        Ok(())
    }
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ReportFormatter for Compact {
    fn format(&self, report: &Report) -> Result<String> {
        Ok(CompactReport(report).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::sample_report;
    use super::*;

    #[test]
    fn test_compact_report() {
        console::set_colors_enabled(false);
        let output = Compact::new().format(&sample_report()).unwrap();

        assert!(output.starts_with("[octo/app] unknown app"));
        assert!(output.contains("SECURITY (2 high)"));
        assert!(output.contains("  [high] Hardcoded secret (2 instances)"));
        assert!(output.contains("    app/Keys.kt:7 via local"));
        assert!(output.contains("    -> Load secrets at runtime"));
        assert!(output.contains("app/Cache.kt via llama"));
        assert!(!output.contains("BATTERY"));
        assert!(output.contains("🔍 4 Findings"));
    }

    #[test]
    fn test_failed_report_shows_error() {
        console::set_colors_enabled(false);
        let mut report = sample_report();
        report.fail(&mobilint_lib::ErrorKind::Cancelled);
        let output = Compact::new().format(&report).unwrap();

        assert!(output.contains("Analysis failed: Analysis was cancelled"));
        assert!(output.contains("🚫 failed"));
    }
}
