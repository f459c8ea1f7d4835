use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use super::prompt::{system_prompt, user_prompt};
use super::{Backend, BackendConfig, CodeRequest, RemoteAnalysis, RemoteBackend};
use crate::{ErrorKind, Finding, FindingKind, Result, Severity, Source};

/// Default upper bound of tokens generated per answer
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// A backend that speaks the OpenAI chat completion protocol.
///
/// GitHub Models and Gemini both expose this protocol, so one
/// implementation serves every [`Backend`].
#[derive(Debug)]
pub struct ChatBackend {
    backend: Backend,
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: SecretString,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// A finding as models tend to write it. Everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawFinding {
    title: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "line")]
    line_number: Option<usize>,
    recommendation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    findings: Vec<RawFinding>,
    summary: String,
}

impl ChatBackend {
    /// Create a backend talking to `endpoint` with the given model and key
    #[must_use]
    pub fn new(
        backend: Backend,
        client: reqwest::Client,
        endpoint: Url,
        model: impl Into<String>,
        api_key: SecretString,
    ) -> Self {
        Self {
            backend,
            client,
            endpoint,
            model: model.into(),
            api_key,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Create a backend from its configuration.
    ///
    /// The API key is taken from the config, or else from the backend's
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MissingApiKey`] if no key can be found, or
    /// [`ErrorKind::NetworkRequest`] if the HTTP client cannot be built.
    pub fn from_config(backend: Backend, config: BackendConfig) -> Result<Self> {
        let model = config.effective_model(backend);
        let timeout = config.effective_timeout();
        let api_key = match config.api_key {
            Some(key) => key,
            None => std::env::var(backend.api_key_env())
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::from)
                .ok_or(ErrorKind::MissingApiKey(backend))?,
        };
        let endpoint = match config.endpoint {
            Some(endpoint) => endpoint,
            None => Url::parse(backend.default_endpoint())
                .map_err(|_| ErrorKind::InvalidEndpoint(backend.default_endpoint().to_string()))?,
        };
        let client = reqwest::ClientBuilder::new()
            .user_agent(crate::DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self::new(backend, client, endpoint, model, api_key))
    }

    fn completions_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ErrorKind::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["chat", "completions"]);
        Ok(url)
    }

    fn malformed(&self, reason: impl Into<String>) -> ErrorKind {
        ErrorKind::MalformedResponse {
            backend: self.backend,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemoteBackend for ChatBackend {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn analyze_code(&self, request: CodeRequest<'_>) -> Result<RemoteAnalysis> {
        log::debug!(
            "Sending {} analysis of {} to {} ({} characters)",
            request.kind,
            request.file_path,
            self.backend,
            request.code.len()
        );

        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system".into(),
                    content: system_prompt(request.kind, request.app_type),
                },
                Message {
                    role: "user".into(),
                    content: user_prompt(&request),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut bearer = HeaderValue::try_from(format!("Bearer {}", self.api_key.expose_secret()))?;
        bearer.set_sensitive(true);

        let response = self
            .client
            .post(self.completions_url()?)
            .header(AUTHORIZATION, bearer)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::BackendStatus {
                backend: self.backend,
                status,
            });
        }

        let response: ChatResponse = response.json().await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| self.malformed("response contains no choices"))?;

        let raw = parse_content(&content);
        let source = Source::Backend(self.backend);
        let findings = raw
            .findings
            .into_iter()
            .map(|f| f.into_finding(&request, source))
            .collect();

        Ok(RemoteAnalysis {
            findings,
            summary: raw.summary,
        })
    }
}

impl RawFinding {
    fn into_finding(self, request: &CodeRequest<'_>, source: Source) -> Finding {
        let severity = self
            .severity
            .and_then(|s| s.trim().parse::<Severity>().ok())
            .unwrap_or(Severity::Medium);
        let kind = self
            .kind
            .and_then(|k| k.trim().parse::<FindingKind>().ok())
            .unwrap_or_default();
        Finding {
            title: self.title.unwrap_or_else(|| "Untitled finding".to_string()),
            category: request.kind,
            severity,
            kind,
            description: self.description.unwrap_or_default(),
            recommendation: self.recommendation.unwrap_or_default(),
            file_path: request.file_path.to_string(),
            line_number: self.line_number,
            source,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Interpret a model answer.
///
/// Models often wrap JSON in a markdown fence or add prose around it. The
/// outermost `{...}` is tried first. Anything else is read as
/// `Key: value` prose.
fn parse_content(content: &str) -> RawAnalysis {
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(analysis) = serde_json::from_str::<RawAnalysis>(&content[start..=end]) {
                return analysis;
            }
        }
    }
    log::warn!("Backend answer is not JSON, falling back to plain text parsing");
    parse_prose(content)
}

fn parse_prose(content: &str) -> RawAnalysis {
    let mut findings = Vec::new();
    let mut current: Option<RawFinding> = None;

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim_start_matches(['-', '*', ' ']).to_ascii_lowercase();
        let value = value.trim().to_string();

        if ["issue", "problem", "finding"].iter().any(|k| key.contains(k)) {
            findings.extend(current.take());
            current = Some(RawFinding {
                title: Some(value),
                ..RawFinding::default()
            });
        } else if let Some(finding) = current.as_mut() {
            if key.contains("description") {
                finding.description = Some(value);
            } else if key.contains("recommendation") || key.contains("solution") {
                finding.recommendation = Some(value);
            } else if key.contains("severity") {
                finding.severity = Some(value);
            }
        }
    }
    findings.extend(current);

    if findings.is_empty() {
        findings.push(RawFinding {
            title: Some("Unstructured analysis result".to_string()),
            description: Some(content.chars().take(500).collect()),
            severity: Some("info".to_string()),
            kind: Some("recommendation".to_string()),
            ..RawFinding::default()
        });
    }

    let summary = format!("Found {} potential problem(s)", findings.len());
    RawAnalysis { findings, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalysisKind, AppType, Language};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    static NO_OPTIONS: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    fn request<'a>(local: &'a [Finding]) -> CodeRequest<'a> {
        CodeRequest {
            code: "Log.d(TAG, password)",
            file_path: "app/src/main/java/Login.java",
            language: Language::Java,
            kind: AnalysisKind::Security,
            app_type: AppType::NativeAndroid,
            local_findings: local,
            options: &NO_OPTIONS,
        }
    }

    fn backend(server: &MockServer) -> ChatBackend {
        ChatBackend::new(
            Backend::OpenAi,
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            "gpt-4o",
            SecretString::from("test-key"),
        )
    }

    #[tokio::test]
    async fn test_parses_json_findings() {
        let server = MockServer::start().await;
        let content = r#"```json
{"findings":[{"title":"Password logged","severity":"high","lineNumber":1,"recommendation":"Remove the log call"}],"summary":"One issue"}
```"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "model": "gpt-4o" })))
            .respond_with(test_utils::chat_completion!(content))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = backend(&server).analyze_code(request(&[])).await.unwrap();

        assert_eq!(analysis.summary, "One issue");
        assert_eq!(analysis.findings.len(), 1);
        let finding = &analysis.findings[0];
        assert_eq!(finding.title, "Password logged");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.line_number, Some(1));
        assert_eq!(finding.source, Source::Backend(Backend::OpenAi));
        assert_eq!(finding.category, AnalysisKind::Security);
        assert_eq!(finding.file_path, "app/src/main/java/Login.java");
    }

    #[tokio::test]
    async fn test_error_status_is_a_fault() {
        let server = test_utils::mock_chat_server!(status = 429);

        let err = backend(&server).analyze_code(request(&[])).await.unwrap_err();
        assert!(matches!(
            err,
            ErrorKind::BackendStatus {
                backend: Backend::OpenAi,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = backend(&server).analyze_code(request(&[])).await.unwrap_err();
        assert!(matches!(err, ErrorKind::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_endpoint_with_path_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/openai/chat/completions"))
            .respond_with(test_utils::chat_completion!(r#"{"findings":[],"summary":"clean"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ChatBackend::new(
            Backend::Gemini,
            reqwest::Client::new(),
            Url::parse(&format!("{}/v1beta/openai/", server.uri())).unwrap(),
            "gemini-2.0-flash",
            SecretString::from("k"),
        );
        let analysis = backend.analyze_code(request(&[])).await.unwrap();
        assert!(analysis.findings.is_empty());
        assert_eq!(analysis.summary, "clean");
    }

    #[test]
    fn test_parse_prose() {
        let analysis = parse_content(
            "Issue: Cleartext traffic\nDescription: HTTP is used\nSeverity: High\n\
             Solution: Use HTTPS\n\nProblem: Weak hash\nSeverity: low",
        );
        assert_eq!(analysis.findings.len(), 2);
        assert_eq!(analysis.findings[0].title.as_deref(), Some("Cleartext traffic"));
        assert_eq!(analysis.findings[0].recommendation.as_deref(), Some("Use HTTPS"));
        assert_eq!(analysis.findings[1].severity.as_deref(), Some("low"));
    }

    #[test]
    fn test_parse_unstructured() {
        let analysis = parse_content("Looks fine to me.");
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(
            analysis.findings[0].title.as_deref(),
            Some("Unstructured analysis result")
        );
    }

    #[test]
    fn test_unknown_severity_defaults_to_medium() {
        let local: [Finding; 0] = [];
        let finding = RawFinding {
            severity: Some("catastrophic".into()),
            ..RawFinding::default()
        }
        .into_finding(&request(&local), Source::Backend(Backend::Llama));
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.kind, FindingKind::Issue);
    }
}
