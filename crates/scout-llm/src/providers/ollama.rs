//! Local models served by Ollama.

use super::common::{http_client, read_json};
use crate::error::Result;
use crate::provider::{Completion, CompletionRequest, LlmProvider, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Default Ollama endpoint.
pub const DEFAULT_URL: &str = "http://localhost:11434";

/// Ollama `/api/generate` in JSON format mode.
pub struct OllamaProvider {
    model: String,
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    /// Provider for the default model on the default endpoint.
    pub fn new() -> Result<Self> {
        Self::with_url(DEFAULT_URL, DEFAULT_MODEL)
    }

    /// Provider for `model` served at `base_url`.
    pub fn with_url(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            // Local models are slow on first load
            client: http_client(Duration::from_secs(120))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.body(request))
            .send()
            .await?;
        let generated: GenerateResponse = read_json(self.name(), response).await?;

        Ok(Completion {
            text: generated.response,
            model: generated.model,
            usage: generated
                .prompt_eval_count
                .zip(generated.eval_count)
                .map(|(input_tokens, output_tokens)| Usage {
                    input_tokens,
                    output_tokens,
                }),
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    model: String,
    response: String,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}
