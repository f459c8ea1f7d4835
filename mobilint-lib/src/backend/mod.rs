//! Remote analysis backends.
//!
//! A [`Backend`] names a provider. Each provider implements
//! [`RemoteBackend`] and is registered in a [`BackendRegistry`] keyed by its
//! name. The orchestrator only ever dispatches through the registry.

mod chat;
mod config;
mod prompt;
mod registry;

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub use chat::ChatBackend;
pub use config::{BackendConfig, BackendConfigs, DEFAULT_BACKEND_TIMEOUT};
pub use registry::BackendRegistry;

use crate::{AnalysisKind, AppType, Finding, Language, Result};

/// Endpoint of the GitHub Models inference service
const GITHUB_MODELS_ENDPOINT: &str = "https://models.inference.ai.azure.com";

/// OpenAI compatible endpoint of the Gemini API
const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A remote analysis provider
#[derive(
    Debug,
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
pub enum Backend {
    /// `gpt-4o` served through GitHub Models
    OpenAi,
    /// `DeepSeek-R1` served through GitHub Models
    DeepSeek,
    /// `Llama-3.3-70B-Instruct` served through GitHub Models
    Llama,
    /// Google Gemini
    Gemini,
}

impl Backend {
    /// The backends files are distributed over by default, in priority order
    pub const LANES: [Backend; 3] = [Backend::OpenAi, Backend::DeepSeek, Backend::Llama];

    /// Base URL of the chat completion API
    #[must_use]
    pub const fn default_endpoint(self) -> &'static str {
        match self {
            Backend::OpenAi | Backend::DeepSeek | Backend::Llama => GITHUB_MODELS_ENDPOINT,
            Backend::Gemini => GEMINI_ENDPOINT,
        }
    }

    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Backend::OpenAi => "gpt-4o",
            Backend::DeepSeek => "DeepSeek-R1",
            Backend::Llama => "Llama-3.3-70B-Instruct",
            Backend::Gemini => "gemini-2.0-flash",
        }
    }

    /// Environment variable the API key is read from
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Backend::OpenAi | Backend::DeepSeek | Backend::Llama => "GITHUB_TOKEN",
            Backend::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Longest code body, in characters, sent to this backend
    #[must_use]
    pub const fn max_code_chars(self) -> usize {
        match self {
            Backend::Gemini => 30_000,
            Backend::OpenAi | Backend::DeepSeek | Backend::Llama => 20_000,
        }
    }
}

/// Input of a single remote analysis
#[derive(Debug, Clone, Copy)]
pub struct CodeRequest<'a> {
    /// Code body, already truncated to the backend's limit
    pub code: &'a str,
    pub file_path: &'a str,
    pub language: Language,
    pub kind: AnalysisKind,
    pub app_type: AppType,
    /// What the local detectors already reported for this file and kind
    pub local_findings: &'a [Finding],
    /// Free-form options of the run, see [`AnalysisOptions::extra`](crate::AnalysisOptions::extra)
    pub options: &'a BTreeMap<String, serde_json::Value>,
}

/// Output of a single remote analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAnalysis {
    pub findings: Vec<Finding>,
    pub summary: String,
}

/// A remote service that can analyze a piece of code
#[async_trait]
pub trait RemoteBackend: Send + Sync + Debug {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Analyze one code body.
    ///
    /// # Errors
    ///
    /// Fails on network errors, timeouts, non-success responses and responses
    /// that cannot be interpreted.
    async fn analyze_code(&self, request: CodeRequest<'_>) -> Result<RemoteAnalysis>;
}

/// Cut `code` down to at most `max_chars` characters
#[must_use]
pub fn truncate_code(code: &str, max_chars: usize) -> &str {
    match code.char_indices().nth(max_chars) {
        Some((end, _)) => {
            log::warn!(
                "Truncating code from {} to {max_chars} characters",
                code.chars().count()
            );
            &code[..end]
        }
        None => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::OpenAi.to_string(), "openai");
        assert_eq!(Backend::DeepSeek.to_string(), "deepseek");
        assert_eq!(Backend::from_str("deepSeek").unwrap(), Backend::DeepSeek);
        assert_eq!(Backend::from_str("LLAMA").unwrap(), Backend::Llama);
        assert!(Backend::from_str("claude").is_err());
    }

    #[test]
    fn test_truncate_code() {
        assert_eq!(truncate_code("abcdef", 3), "abc");
        assert_eq!(truncate_code("abc", 3), "abc");
        assert_eq!(truncate_code("abc", 10), "abc");
        // Multi-byte characters are never split
        assert_eq!(truncate_code("ééé", 2), "éé");
    }

    #[test]
    fn test_code_limits() {
        assert_eq!(Backend::OpenAi.max_code_chars(), 20_000);
        assert_eq!(Backend::Gemini.max_code_chars(), 30_000);
    }
}
