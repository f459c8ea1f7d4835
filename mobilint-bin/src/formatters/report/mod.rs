mod compact;
mod json;
mod markdown;

pub(crate) use compact::Compact;
pub(crate) use json::Json;
pub(crate) use markdown::Markdown;

use anyhow::Result;
use mobilint_lib::{AnalysisKind, Finding, Report};

pub(crate) trait ReportFormatter {
    /// Format a finished report for output
    fn format(&self, report: &Report) -> Result<String>;
}

/// Where a finding points to, e.g. `app/Main.kt:12`
fn location(finding: &Finding) -> String {
    match finding.line_number {
        Some(line) => format!("{}:{line}", finding.file_path),
        None => finding.file_path.clone(),
    }
}

/// Headline counts of one kind, e.g. `1 critical, 2 high` or
/// `3 issues, 1 recommendation`
fn kind_counts(report: &Report, kind: AnalysisKind) -> String {
    let summary = report.summary();
    match summary.counts(kind) {
        Some(counts) => format!(
            "{} {}, {} {}",
            counts.issues,
            plural(counts.issues, "issue"),
            counts.recommendations,
            plural(counts.recommendations, "recommendation")
        ),
        None => {
            let security = summary.security;
            let parts: Vec<_> = [
                ("critical", security.critical),
                ("high", security.high),
                ("medium", security.medium),
                ("low", security.low),
                ("info", security.info),
            ]
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| format!("{count} {label}"))
            .collect();
            if parts.is_empty() {
                "no findings".to_string()
            } else {
                parts.join(", ")
            }
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use mobilint_lib::{AnalysisKind, Finding, FindingKind, Report, Severity, Source, Backend};

    /// A report with two security findings sharing a title, a memory
    /// recommendation and a clean battery result
    pub(crate) fn sample_report() -> Report {
        let mut report = Report::new("https://github.com/octo/app");
        report.repo_owner = Some("octo".into());
        report.repo_name = Some("app".into());
        let secret = |path: &str, line| {
            Finding::builder()
                .title("Hardcoded secret")
                .category(AnalysisKind::Security)
                .severity(Severity::High)
                .description("An API key is embedded in the source")
                .recommendation("Load secrets at runtime")
                .file_path(path)
                .line_number(line)
                .build()
        };
        report
            .add_finding(AnalysisKind::Security, secret("app/Api.kt", 3))
            .unwrap();
        report
            .add_finding(AnalysisKind::Security, secret("app/Keys.kt", 7))
            .unwrap();
        report
            .add_finding(
                AnalysisKind::Memory,
                Finding::builder()
                    .title("Static reference to a context")
                    .category(AnalysisKind::Memory)
                    .severity(Severity::Medium)
                    .kind(FindingKind::Recommendation)
                    .file_path("app/Cache.kt")
                    .source(Source::Backend(Backend::Llama))
                    .build(),
            )
            .unwrap();
        report
            .add_finding(
                AnalysisKind::Battery,
                Finding::no_issues(AnalysisKind::Battery, "app/Api.kt"),
            )
            .unwrap();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::sample_report;
    use super::*;

    #[test]
    fn test_kind_counts() {
        let report = sample_report();
        assert_eq!(kind_counts(&report, AnalysisKind::Security), "2 high");
        assert_eq!(
            kind_counts(&report, AnalysisKind::Memory),
            "0 issues, 1 recommendation"
        );
        assert_eq!(
            kind_counts(&Report::new("x"), AnalysisKind::Security),
            "no findings"
        );
    }
}
