//! Provider selection with failover.

use crate::error::{LlmError, Result};
use crate::provider::{Completion, CompletionRequest, LlmProvider};
use crate::providers::{ollama, AnthropicProvider, OllamaProvider, OpenAiProvider};
use scout_core::LlmConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Holds the configured providers and tries them in preference order.
///
/// A failing provider hands the request to the next candidate; when every
/// candidate fails the last error is returned.
pub struct LlmRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
    preference: RoutingPreference,
}

impl LlmRouter {
    /// Empty router.
    #[must_use]
    pub fn new(preference: RoutingPreference) -> Self {
        Self {
            providers: Vec::new(),
            preference,
        }
    }

    /// Router holding the single provider named in `[llm]`.
    ///
    /// Cloud providers need `api_key`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let model = config.model.as_deref();
        let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
            "anthropic" => {
                let key = require_key("anthropic", config)?;
                Arc::new(match model {
                    Some(model) => AnthropicProvider::with_model(key, model)?,
                    None => AnthropicProvider::new(key)?,
                })
            }
            "openai" => {
                let key = require_key("openai", config)?;
                Arc::new(match model {
                    Some(model) => OpenAiProvider::with_model(key, model)?,
                    None => OpenAiProvider::new(key)?,
                })
            }
            "ollama" => Arc::new(OllamaProvider::with_url(
                &config.ollama_url,
                model.unwrap_or(ollama::DEFAULT_MODEL),
            )?),
            other => return Err(LlmError::UnknownProvider(other.to_string())),
        };

        let preference = if provider.is_local() {
            RoutingPreference::LocalOnly
        } else {
            RoutingPreference::Ordered
        };

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            "Reasoning provider configured"
        );

        let mut router = Self::new(preference);
        router.add_provider(provider);
        Ok(router)
    }

    /// Register a provider after the existing ones.
    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.push(provider);
    }

    /// Current routing preference.
    #[must_use]
    pub fn preference(&self) -> RoutingPreference {
        self.preference
    }

    /// Names of the registered providers, in registration order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run a completion, failing over between candidates.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut last_error = LlmError::NoProviderAvailable;
        for provider in self.candidates() {
            match provider.complete(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next candidate"
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn candidates(&self) -> Vec<&Arc<dyn LlmProvider>> {
        match self.preference {
            RoutingPreference::LocalOnly => {
                self.providers.iter().filter(|p| p.is_local()).collect()
            }
            RoutingPreference::PreferLocal => {
                let (mut local, cloud): (Vec<_>, Vec<_>) =
                    self.providers.iter().partition(|p| p.is_local());
                local.extend(cloud);
                local
            }
            RoutingPreference::Ordered => self.providers.iter().collect(),
        }
    }
}

fn require_key<'a>(provider: &str, config: &'a LlmConfig) -> Result<&'a str> {
    config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| LlmError::AuthenticationFailed {
            provider: provider.to_string(),
            message: "no API key configured".to_string(),
        })
}

/// Order in which the router tries its providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPreference {
    /// Local providers only
    LocalOnly,
    /// Local first, cloud as fallback
    PreferLocal,
    /// Registration order
    Ordered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockProvider {
        name: &'static str,
        local: bool,
        fail: bool,
    }

    fn mock(name: &'static str, local: bool) -> Arc<dyn LlmProvider> {
        Arc::new(MockProvider {
            name,
            local,
            fail: false,
        })
    }

    fn broken(name: &'static str) -> Arc<dyn LlmProvider> {
        Arc::new(MockProvider {
            name,
            local: false,
            fail: true,
        })
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            if self.fail {
                return Err(LlmError::ApiError {
                    provider: self.name.to_string(),
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(Completion {
                text: request.prompt.clone(),
                model: self.name.to_string(),
                usage: None,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            self.name
        }

        fn is_local(&self) -> bool {
            self.local
        }
    }

    fn router(preference: RoutingPreference, providers: Vec<Arc<dyn LlmProvider>>) -> LlmRouter {
        let mut router = LlmRouter::new(preference);
        for provider in providers {
            router.add_provider(provider);
        }
        router
    }

    #[tokio::test]
    async fn test_local_only_skips_cloud() {
        let router = router(
            RoutingPreference::LocalOnly,
            vec![mock("anthropic", false), mock("ollama", true)],
        );
        let completion = router
            .complete(&CompletionRequest::new("Hello"))
            .await
            .expect("complete");
        assert_eq!(completion.model, "ollama");
    }

    #[tokio::test]
    async fn test_prefer_local_tries_local_first() {
        let router = router(
            RoutingPreference::PreferLocal,
            vec![mock("openai", false), mock("ollama", true)],
        );
        let completion = router
            .complete(&CompletionRequest::new("Hello"))
            .await
            .expect("complete");
        assert_eq!(completion.model, "ollama");
    }

    #[tokio::test]
    async fn test_failover_passes_request_along() {
        let router = router(
            RoutingPreference::Ordered,
            vec![broken("anthropic"), mock("openai", false)],
        );
        let completion = router
            .complete(&CompletionRequest::new("Is this a directory?"))
            .await
            .expect("complete");
        assert_eq!(completion.model, "openai");
        assert_eq!(completion.text, "Is this a directory?");
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let router = router(
            RoutingPreference::Ordered,
            vec![broken("anthropic"), broken("openai")],
        );
        match router.complete(&CompletionRequest::new("Hello")).await {
            Err(LlmError::ApiError { provider, .. }) => assert_eq!(provider, "openai"),
            other => panic!("expected ApiError from openai, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_eligible_provider() {
        let router = router(RoutingPreference::LocalOnly, vec![mock("anthropic", false)]);
        let result = router.complete(&CompletionRequest::new("Hello")).await;
        assert!(matches!(result, Err(LlmError::NoProviderAvailable)));
    }

    #[test]
    fn test_from_config_requires_key() {
        let result = LlmRouter::from_config(&LlmConfig::default());
        assert!(matches!(result, Err(LlmError::AuthenticationFailed { .. })));
    }

    #[test]
    fn test_from_config_ollama_is_local_only() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        };
        let router = LlmRouter::from_config(&config).expect("router");
        assert_eq!(router.preference(), RoutingPreference::LocalOnly);
        assert_eq!(router.provider_names(), vec!["ollama"]);
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmRouter::from_config(&config),
            Err(LlmError::UnknownProvider(name)) if name == "gemini"
        ));
    }
}
