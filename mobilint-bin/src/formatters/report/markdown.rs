use std::fmt::{self, Display};

use anyhow::Result;
use mobilint_lib::{AnalysisKind, Report};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Segment},
};

use super::{ReportFormatter, kind_counts, location};

#[derive(Tabled)]
struct SummaryTableEntry {
    #[tabled(rename = "Kind")]
    kind: AnalysisKind,
    #[tabled(rename = "Findings")]
    findings: String,
}

fn summary_table(report: &Report) -> String {
    let entries = AnalysisKind::ALL.into_iter().map(|kind| SummaryTableEntry {
        kind,
        findings: kind_counts(report, kind),
    });

    Table::new(entries)
        .with(Modify::new(Segment::all()).with(Alignment::left()))
        .with(Style::markdown())
        .to_string()
}

struct MarkdownReport<'a>(&'a Report);

impl Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;

        writeln!(f, "# Analysis of {}", report.repo_url)?;
        writeln!(f)?;
        writeln!(f, "* Status: {}", report.status())?;
        writeln!(f, "* App type: {}", report.app_type)?;
        if let Some(error) = report.error() {
            writeln!(f, "* Error: {}", error.message)?;
        }
        writeln!(f)?;
        writeln!(f, "## Summary")?;
        writeln!(f)?;
        writeln!(f, "{}", summary_table(report))?;

        for kind in AnalysisKind::ALL {
            let groups: Vec<_> = report
                .grouped(kind)
                .into_iter()
                .filter(|group| !group.instances.iter().all(|f| f.is_no_issues()))
                .collect();
            if groups.is_empty() {
                continue;
            }

            writeln!(f)?;
            writeln!(f, "## {}", capitalize(&kind.to_string()))?;
            for group in groups {
                let first = group.instances[0];
                writeln!(f)?;
                writeln!(f, "### {} ({})", group.title, first.severity)?;
                writeln!(f)?;
                if !first.description.is_empty() {
                    writeln!(f, "{}", first.description)?;
                    writeln!(f)?;
                }
                for finding in &group.instances {
                    writeln!(f, "* `{}` ({})", location(finding), finding.source)?;
                }
                if !first.recommendation.is_empty() {
                    writeln!(f)?;
                    writeln!(f, "**Recommendation:** {}", first.recommendation)?;
                }
            }
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

pub(crate) struct Markdown;

impl Markdown {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ReportFormatter for Markdown {
    fn format(&self, report: &Report) -> Result<String> {
        Ok(MarkdownReport(report).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::sample_report;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_table() {
        let table = summary_table(&sample_report());
        let expected = "| Kind        | Findings                    |
|-------------|-----------------------------|
| security    | 2 high                      |
| performance | 0 issues, 0 recommendations |
| memory      | 0 issues, 1 recommendation  |
| battery     | 0 issues, 1 recommendation  |";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_markdown_report() {
        let output = Markdown::new().format(&sample_report()).unwrap();

        assert!(output.starts_with("# Analysis of https://github.com/octo/app\n"));
        assert!(output.contains("## Security\n\n### Hardcoded secret (high)\n"));
        assert!(output.contains("* `app/Api.kt:3` (local)\n* `app/Keys.kt:7` (local)\n"));
        assert!(output.contains("**Recommendation:** Load secrets at runtime"));
        assert!(output.contains("## Memory"));
        assert!(!output.contains("## Battery"));
    }
}
