use std::fmt::Write;

use super::CodeRequest;
use crate::{AnalysisKind, AppType};

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "findings": [
    {
      "title": "short title",
      "description": "what is wrong and why it matters",
      "severity": "critical | high | medium | low | info",
      "type": "issue | recommendation",
      "lineNumber": 42,
      "recommendation": "how to fix it"
    }
  ],
  "summary": "one paragraph assessment"
}
Return an empty findings array if the code has no problems."#;

fn focus(kind: AnalysisKind) -> &'static str {
    match kind {
        AnalysisKind::Security => {
            "security problems: insecure data storage, weak authentication or \
             authorization, injection, insecure network communication, weak \
             cryptography, hardcoded secrets, unprotected endpoints and \
             insecure configuration"
        }
        AnalysisKind::Performance => {
            "performance problems: inefficient loops or algorithms, unoptimized \
             network calls, poor caching, heavy work on the main thread, \
             expensive rendering or animations and unresponsive UI"
        }
        AnalysisKind::Memory => {
            "memory problems: leaks, resources that are never released, \
             excessive allocation, retained contexts or views and reference \
             cycles"
        }
        AnalysisKind::Battery => {
            "battery problems: inefficient location updates, frequent or \
             unnecessary network activity, wake locks, background work that \
             never stops and polling sensors"
        }
    }
}

fn platform(app_type: AppType) -> String {
    match app_type {
        AppType::Unknown => "mobile".to_string(),
        other => other.to_string(),
    }
}

/// System message for one analysis kind and platform
pub(super) fn system_prompt(kind: AnalysisKind, app_type: AppType) -> String {
    format!(
        "You are an expert reviewer of {} application code. Analyze the code \
         for {}. Give a concrete recommendation for every finding.\n\n{RESPONSE_FORMAT}",
        platform(app_type),
        focus(kind),
    )
}

/// User message carrying the code and what local detectors already found
pub(super) fn user_prompt(request: &CodeRequest<'_>) -> String {
    let mut prompt = format!(
        "Analyze the following {} file `{}`:\n\n```\n{}\n```\n",
        request.language, request.file_path, request.code
    );

    let known: Vec<_> = request
        .local_findings
        .iter()
        .filter(|f| !f.is_no_issues())
        .collect();
    if !known.is_empty() {
        prompt.push_str("\nA static pattern scan already reported these findings. Confirm, refine or add to them:\n");
        for finding in known {
            let _ = match finding.line_number {
                Some(line) => writeln!(prompt, "- [{}] {} (line {line})", finding.severity, finding.title),
                None => writeln!(prompt, "- [{}] {}", finding.severity, finding.title),
            };
        }
    }

    if !request.options.is_empty() {
        prompt.push_str("\nTake these options of the caller into account:\n");
        for (key, value) in request.options {
            let _ = match value {
                serde_json::Value::String(value) => writeln!(prompt, "- {key}: {value}"),
                value => writeln!(prompt, "- {key}: {value}"),
            };
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Finding, Language, Severity};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_system_prompt_mentions_platform_and_kind() {
        let prompt = system_prompt(AnalysisKind::Battery, AppType::Flutter);
        assert!(prompt.contains("flutter application"));
        assert!(prompt.contains("wake locks"));
        assert!(prompt.contains("\"findings\""));

        let prompt = system_prompt(AnalysisKind::Memory, AppType::Unknown);
        assert!(prompt.contains("mobile application"));
    }

    #[test]
    fn test_user_prompt_lists_local_findings() {
        let local = vec![
            Finding::builder()
                .title("Hardcoded API key")
                .category(AnalysisKind::Security)
                .severity(Severity::High)
                .file_path("Api.kt")
                .line_number(7)
                .build(),
            Finding::no_issues(AnalysisKind::Security, "Api.kt"),
        ];
        let request = CodeRequest {
            code: "val key = \"abc\"",
            file_path: "Api.kt",
            language: Language::Kotlin,
            kind: AnalysisKind::Security,
            app_type: AppType::NativeAndroid,
            local_findings: &local,
            options: &BTreeMap::new(),
        };

        let prompt = user_prompt(&request);
        assert!(prompt.contains("Kotlin file `Api.kt`"));
        assert!(prompt.contains("- [high] Hardcoded API key (line 7)"));
        assert!(!prompt.contains("No issues found"));
        assert!(!prompt.contains("options of the caller"));
    }

    #[test]
    fn test_user_prompt_lists_caller_options() {
        let options = BTreeMap::from([
            ("language".to_string(), json!("German")),
            ("minSdk".to_string(), json!(21)),
        ]);
        let request = CodeRequest {
            code: "class Main",
            file_path: "Main.kt",
            language: Language::Kotlin,
            kind: AnalysisKind::Performance,
            app_type: AppType::NativeAndroid,
            local_findings: &[],
            options: &options,
        };

        let prompt = user_prompt(&request);
        assert!(prompt.contains("Take these options of the caller into account:\n- language: German\n- minSdk: 21\n"));
    }
}
