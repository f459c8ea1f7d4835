use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use super::Backend;
use crate::ratelimit::QuotaConfig;

/// Default timeout of a single remote analysis call
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-backend configuration overrides, keyed by backend name
pub type BackendConfigs = HashMap<Backend, BackendConfig>;

/// Configuration of a single remote backend.
///
/// Every field is optional. Unset fields fall back to the backend's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Maximum requests per window
    pub capacity: Option<usize>,

    /// Length of the quota window
    #[serde(default, with = "humantime_serde")]
    pub window: Option<Duration>,

    /// Model name sent with every request
    pub model: Option<String>,

    /// Base URL of an OpenAI compatible chat completion API
    pub endpoint: Option<Url>,

    /// API key. Falls back to the backend's environment variable.
    pub api_key: Option<SecretString>,

    /// Timeout of a single analysis call
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl BackendConfig {
    /// The backend's quota with this config's overrides applied
    #[must_use]
    pub fn effective_quota(&self, backend: Backend) -> QuotaConfig {
        QuotaConfig::default_for(backend).with_overrides(self.capacity, self.window)
    }

    #[must_use]
    pub fn effective_model(&self, backend: Backend) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| backend.default_model().to_string())
    }

    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_BACKEND_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_effective_values() {
        let config = BackendConfig::default();
        assert_eq!(
            config.effective_quota(Backend::Llama),
            QuotaConfig::default_for(Backend::Llama)
        );
        assert_eq!(config.effective_model(Backend::Llama), "Llama-3.3-70B-Instruct");
        assert_eq!(config.effective_timeout(), DEFAULT_BACKEND_TIMEOUT);
    }

    #[test]
    fn test_deserialize_backend_table() {
        let configs: BackendConfigs = toml::from_str(
            r#"
            [openai]
            capacity = 2
            window = "10s"
            model = "gpt-4o-mini"

            [deepseek]
            api_key = "secret"
            endpoint = "http://localhost:8080/v1"
            "#,
        )
        .unwrap();

        let openai = &configs[&Backend::OpenAi];
        assert_eq!(
            openai.effective_quota(Backend::OpenAi),
            QuotaConfig::new(2, Duration::from_secs(10))
        );
        assert_eq!(openai.effective_model(Backend::OpenAi), "gpt-4o-mini");

        let deepseek = &configs[&Backend::DeepSeek];
        assert_eq!(deepseek.api_key.as_ref().unwrap().expose_secret(), "secret");
        assert_eq!(
            deepseek.endpoint.as_ref().unwrap().as_str(),
            "http://localhost:8080/v1"
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<BackendConfig, _> = toml::from_str("concurrency = 3");
        assert!(result.is_err());
    }
}
