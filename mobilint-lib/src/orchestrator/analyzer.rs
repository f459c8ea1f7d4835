use async_trait::async_trait;
use tokio::time::Instant;

use super::Inner;
use crate::backend::{Backend, CodeRequest, truncate_code};
use crate::deferred::Replay;
use crate::report::SharedReport;
use crate::{AnalysisKind, AnalysisRequest, ErrorKind, Finding, Result, Source};

impl Inner {
    /// Local findings of `request`, never empty
    fn local_findings(&self, request: &AnalysisRequest) -> Vec<Finding> {
        let file = &request.file;
        let mut findings = self.detectors.run(
            request.kind,
            &file.content,
            &file.path,
            request.language,
            request.app_type,
        );
        if findings.is_empty() {
            findings.push(Finding::no_issues(request.kind, &file.path));
        }
        findings
    }

    pub(super) async fn analyze_file(&self, request: AnalysisRequest) -> Vec<Finding> {
        let mut findings = self.local_findings(&request);
        append(&request.report, request.kind, &findings);

        if request.mode.is_local_only() {
            return findings;
        }

        let Some(backend) = self
            .selector
            .acquire(request.preferred, self.selector.candidates())
        else {
            self.limiter.record_deferral(request.preferred);
            self.queue.enqueue(request);
            return findings;
        };

        match self.analyze_remote(&request, backend, &findings).await {
            Ok(remote) => findings.extend(remote),
            Err(e) => log::warn!(
                "{backend} failed to analyze {} for {}: {e}",
                request.file.path,
                request.kind
            ),
        }
        findings
    }

    /// Send `request` to `backend`, whose quota was already charged, and
    /// append the attributed findings to the report
    async fn analyze_remote(
        &self,
        request: &AnalysisRequest,
        backend: Backend,
        local_findings: &[Finding],
    ) -> Result<Vec<Finding>> {
        let implementation = self.registry.get(backend)?;
        let file = &request.file;
        let code_request = CodeRequest {
            code: truncate_code(&file.content, backend.max_code_chars()),
            file_path: &file.path,
            language: request.language,
            kind: request.kind,
            app_type: request.app_type,
            local_findings,
            options: request.options.as_ref(),
        };

        let start = Instant::now();
        let result = tokio::select! {
            () = request.cancel.cancelled() => Err(ErrorKind::Cancelled),
            result = implementation.analyze_code(code_request) => result,
        };
        let elapsed = start.elapsed();

        let analysis = match result {
            Ok(analysis) => {
                self.limiter.record_success(backend, elapsed);
                analysis
            }
            Err(ErrorKind::Cancelled) => return Err(ErrorKind::Cancelled),
            Err(e) => {
                self.limiter.record_failure(backend, elapsed);
                return Err(e);
            }
        };
        log::debug!(
            "{backend} on {} ({}): {}",
            file.path,
            request.kind,
            analysis.summary
        );

        let findings: Vec<_> = analysis
            .findings
            .into_iter()
            .map(|f| f.attributed(Source::Backend(backend), request.kind, &file.path))
            .collect();
        append(&request.report, request.kind, &findings);
        Ok(findings)
    }
}

#[async_trait]
impl Replay for Inner {
    async fn replay(&self, request: &AnalysisRequest, backend: Backend) -> Result<()> {
        // Local findings were recorded when the request was first seen
        let local_findings = self.local_findings(request);
        self.analyze_remote(request, backend, &local_findings)
            .await
            .map(|_| ())
    }
}

fn append(report: &SharedReport, kind: AnalysisKind, findings: &[Finding]) {
    let mut report = report.write();
    for finding in findings {
        if let Err(e) = report.add_finding(kind, finding.clone()) {
            log::warn!("Dropping {} finding: {e}", finding.title);
            return;
        }
    }
}
