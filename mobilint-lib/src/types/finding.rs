use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString};
use typed_builder::TypedBuilder;

use crate::backend::Backend;
use crate::{AnalysisKind, ErrorKind};

const NO_ISSUES_TITLE: &str = "No issues found";

/// Ordered defect importance, `Info` being the least important
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Whether a finding describes a defect or merely suggests an improvement
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    #[default]
    Issue,
    Recommendation,
}

/// Where a finding came from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// One of the built-in pattern detectors
    #[default]
    Local,
    /// A remote analysis backend
    Backend(Backend),
}

impl Source {
    /// `true` for findings produced by the local detectors
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Source::Local)
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Local => f.write_str("local"),
            Source::Backend(backend) => backend.fmt(f),
        }
    }
}

impl FromStr for Source {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(Source::Local);
        }
        Backend::from_str(s)
            .map(Source::Backend)
            .map_err(|_| ErrorKind::UnknownBackend(s.to_string()))
    }
}

impl Serialize for Source {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One reported defect or informational note about a single file.
///
/// Findings are immutable once they have been added to a
/// [`Report`](crate::Report).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Short, human readable summary
    #[builder(setter(into))]
    pub title: String,
    /// Analysis kind this finding belongs to
    pub category: AnalysisKind,
    #[builder(default)]
    pub severity: Severity,
    #[serde(rename = "type")]
    #[builder(default)]
    pub kind: FindingKind,
    #[builder(default, setter(into))]
    pub description: String,
    #[builder(default, setter(into))]
    pub recommendation: String,
    /// Repository-relative path of the analyzed file
    #[builder(setter(into))]
    pub file_path: String,
    /// 1-based line number, if the detector could pin one down
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    #[builder(default)]
    pub source: Source,
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    /// The informational finding recorded when a detector found nothing.
    ///
    /// It makes a clean result distinguishable from a file that was never
    /// analyzed.
    #[must_use]
    pub fn no_issues(category: AnalysisKind, file_path: &str) -> Self {
        Finding::builder()
            .title(NO_ISSUES_TITLE)
            .category(category)
            .kind(FindingKind::Recommendation)
            .description(format!(
                "The local {category} detectors found no issues in this file"
            ))
            .file_path(file_path)
            .build()
    }

    /// `true` for the note produced by [`Finding::no_issues`]
    #[must_use]
    pub fn is_no_issues(&self) -> bool {
        self.title == NO_ISSUES_TITLE && self.severity == Severity::Info
    }

    /// Re-attribute a finding to `source` for the given file and category
    #[must_use]
    pub fn attributed(mut self, source: Source, category: AnalysisKind, file_path: &str) -> Self {
        self.source = source;
        self.category = category;
        file_path.clone_into(&mut self.file_path);
        self.timestamp = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_source_round_trip() {
        assert_eq!("local".parse::<Source>().unwrap(), Source::Local);
        assert_eq!(
            "deepseek".parse::<Source>().unwrap(),
            Source::Backend(Backend::DeepSeek)
        );
        assert!("mystery".parse::<Source>().is_err());
        assert_eq!(Source::Backend(Backend::OpenAi).to_string(), "openai");
    }

    #[test]
    fn test_no_issues_finding() {
        let finding = Finding::no_issues(AnalysisKind::Memory, "lib/main.dart");
        assert_eq!(finding.severity, Severity::Info);
        assert_eq!(finding.kind, FindingKind::Recommendation);
        assert_eq!(finding.source, Source::Local);
        assert_eq!(finding.file_path, "lib/main.dart");
    }

    #[test]
    fn test_serialize_field_names() {
        let finding = Finding::builder()
            .title("Hardcoded secret")
            .category(AnalysisKind::Security)
            .severity(Severity::High)
            .file_path("Main.kt")
            .line_number(3)
            .source(Source::Backend(Backend::Llama))
            .build();
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "issue");
        assert_eq!(json["filePath"], "Main.kt");
        assert_eq!(json["lineNumber"], 3);
        assert_eq!(json["source"], "llama");
        assert_eq!(json["severity"], "high");
    }
}
