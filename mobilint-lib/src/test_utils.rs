use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{Backend, CodeRequest, RemoteAnalysis, RemoteBackend};
use crate::fetch::{RepositoryFetcher, RepositorySource};
use crate::report::SharedReport;
use crate::{
    AnalysisKind, AnalysisMode, AnalysisRequest, AppType, ErrorKind, Finding, Result, Severity,
    SourceFile,
};

/// A request for `path` preferring `openai`
pub(crate) fn request(
    path: &str,
    kind: AnalysisKind,
    mode: AnalysisMode,
    report: &SharedReport,
) -> AnalysisRequest {
    let file = Arc::new(SourceFile::new(path, "fun main() {}"));
    let language = file.language().unwrap_or(crate::Language::Kotlin);
    AnalysisRequest::new(
        file,
        language,
        kind,
        AppType::NativeAndroid,
        Backend::OpenAi,
        mode,
        report.clone(),
    )
}

/// A finding as a remote backend would return it
pub(crate) fn remote_finding(title: &str) -> Finding {
    Finding::builder()
        .title(title)
        .category(AnalysisKind::Security)
        .severity(Severity::High)
        .description("reported remotely")
        .file_path("ignored")
        .build()
}

#[derive(Debug)]
enum Behavior {
    Findings(Vec<Finding>),
    Fail,
}

/// A remote backend that answers from memory and counts its calls
#[derive(Debug)]
pub(crate) struct MockBackend {
    backend: Backend,
    behavior: Behavior,
    latency: Duration,
    calls: AtomicUsize,
    options: Mutex<Option<BTreeMap<String, serde_json::Value>>>,
}

impl MockBackend {
    pub(crate) fn returning(backend: Backend, findings: Vec<Finding>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            behavior: Behavior::Findings(findings),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            options: Mutex::default(),
        })
    }

    pub(crate) fn failing(backend: Backend) -> Arc<Self> {
        Arc::new(Self {
            backend,
            behavior: Behavior::Fail,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            options: Mutex::default(),
        })
    }

    /// Answers with no findings after `latency`
    pub(crate) fn slow(backend: Backend, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            backend,
            behavior: Behavior::Findings(Vec::new()),
            latency,
            calls: AtomicUsize::new(0),
            options: Mutex::default(),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Options of the most recent call
    pub(crate) fn last_options(&self) -> Option<BTreeMap<String, serde_json::Value>> {
        self.options.lock().clone()
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn analyze_code(&self, request: CodeRequest<'_>) -> Result<RemoteAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.options.lock() = Some(request.options.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.behavior {
            Behavior::Findings(findings) => Ok(RemoteAnalysis {
                findings: findings.clone(),
                summary: format!("{} findings", findings.len()),
            }),
            Behavior::Fail => Err(ErrorKind::MalformedResponse {
                backend: self.backend,
                reason: "mock failure".into(),
            }),
        }
    }
}

/// A fetcher serving a fixed set of files, or failing if it has none
#[derive(Debug, Default)]
pub(crate) struct StaticFetcher(pub(crate) Vec<SourceFile>);

#[async_trait]
impl RepositoryFetcher for StaticFetcher {
    async fn get_all_files(
        &self,
        source: &RepositorySource,
        _app_type_hint: AppType,
        max_files: usize,
    ) -> Result<Vec<SourceFile>> {
        if self.0.is_empty() {
            return Err(ErrorKind::GitHubStatus {
                url: source.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            });
        }
        Ok(self.0.iter().take(max_files).cloned().collect())
    }
}
