//! Local, deterministic defect detectors.
//!
//! A [`LocalDetector`] scans the text of one file for one
//! [`AnalysisKind`]. Detectors must not fail: [`Detectors::run`] treats a
//! panicking detector as one that found nothing.

mod rules;

use std::collections::HashMap;
use std::fmt::Debug;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use regex::Regex;

use crate::{AnalysisKind, AppType, Finding, FindingKind, Language, Severity};

/// Maximum number of findings a single rule reports per file
const MAX_MATCHES_PER_RULE: usize = 5;

/// A synchronous detector for one analysis kind
pub trait LocalDetector: Send + Sync + Debug {
    /// The kind this detector reports on
    fn kind(&self) -> AnalysisKind;

    /// Scan `code` and report what was found. Returns an empty list for
    /// clean code.
    fn analyze(
        &self,
        code: &str,
        file_path: &str,
        language: Language,
        app_type: AppType,
    ) -> Vec<Finding>;
}

/// A single text pattern and what to report when it matches
#[derive(Debug, Clone)]
pub struct Rule {
    pub title: &'static str,
    pub pattern: Regex,
    /// Matches whose line also matches this pattern are ignored
    pub exclude: Option<Regex>,
    pub severity: Severity,
    pub kind: FindingKind,
    pub description: &'static str,
    pub recommendation: &'static str,
    /// Languages the rule applies to. Empty means all.
    pub languages: &'static [Language],
}

impl Rule {
    fn applies_to(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }
}

/// A detector made of a list of [`Rule`]s
#[derive(Debug, Clone)]
pub struct PatternDetector {
    kind: AnalysisKind,
    rules: Vec<Rule>,
}

impl PatternDetector {
    #[must_use]
    pub const fn new(kind: AnalysisKind, rules: Vec<Rule>) -> Self {
        Self { kind, rules }
    }

    /// The built-in rules for `kind`
    #[must_use]
    pub fn builtin(kind: AnalysisKind) -> Self {
        Self::new(kind, rules::builtin(kind))
    }
}

impl LocalDetector for PatternDetector {
    fn kind(&self) -> AnalysisKind {
        self.kind
    }

    fn analyze(
        &self,
        code: &str,
        file_path: &str,
        language: Language,
        _app_type: AppType,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in self.rules.iter().filter(|r| r.applies_to(language)) {
            let mut reported_lines = Vec::new();
            for m in rule.pattern.find_iter(code) {
                let line_start = code[..m.start()].rfind('\n').map_or(0, |i| i + 1);
                let line_end = code[m.end()..]
                    .find('\n')
                    .map_or(code.len(), |i| m.end() + i);
                let line = &code[line_start..line_end];
                if rule.exclude.as_ref().is_some_and(|e| e.is_match(line)) {
                    continue;
                }

                let line_number = code[..m.start()].matches('\n').count() + 1;
                if reported_lines.contains(&line_number) {
                    continue;
                }
                reported_lines.push(line_number);

                findings.push(
                    Finding::builder()
                        .title(rule.title)
                        .category(self.kind)
                        .severity(rule.severity)
                        .kind(rule.kind)
                        .description(rule.description)
                        .recommendation(rule.recommendation)
                        .file_path(file_path)
                        .line_number(line_number)
                        .build(),
                );
                if reported_lines.len() >= MAX_MATCHES_PER_RULE {
                    break;
                }
            }
        }
        findings
    }
}

/// One detector per analysis kind
#[derive(Debug, Clone, Default)]
pub struct Detectors {
    by_kind: HashMap<AnalysisKind, Arc<dyn LocalDetector>>,
}

impl Detectors {
    /// The built-in pattern detectors for every kind
    #[must_use]
    pub fn builtin() -> Self {
        AnalysisKind::ALL
            .into_iter()
            .fold(Self::default(), |detectors, kind| {
                detectors.with(Arc::new(PatternDetector::builtin(kind)))
            })
    }

    /// Add or replace the detector for its kind
    #[must_use]
    pub fn with(mut self, detector: Arc<dyn LocalDetector>) -> Self {
        self.by_kind.insert(detector.kind(), detector);
        self
    }

    /// Run the detector for `kind`.
    ///
    /// A missing or panicking detector yields no findings.
    #[must_use]
    pub fn run(
        &self,
        kind: AnalysisKind,
        code: &str,
        file_path: &str,
        language: Language,
        app_type: AppType,
    ) -> Vec<Finding> {
        let Some(detector) = self.by_kind.get(&kind) else {
            log::debug!("No local {kind} detector registered");
            return Vec::new();
        };
        match catch_unwind(AssertUnwindSafe(|| {
            detector.analyze(code, file_path, language, app_type)
        })) {
            Ok(findings) => findings,
            Err(_) => {
                log::error!("Local {kind} detector panicked on {file_path}, treating as empty");
                Vec::new()
            }
        }
    }
}
