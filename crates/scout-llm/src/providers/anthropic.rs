//! Anthropic Messages API.

use super::common::{http_client, read_json};
use crate::error::Result;
use crate::provider::{Completion, CompletionRequest, LlmProvider, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Claude via the Messages API.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl AnthropicProvider {
    /// Provider for the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    /// Provider for a specific model.
    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client: http_client(Duration::from_secs(60))?,
        })
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(request))
            .send()
            .await?;
        let message: MessageResponse = read_json(self.name(), response).await?;
        Ok(message.into_completion())
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Option<MessageUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessageResponse {
    /// Text blocks joined in order; tool-use and other blocks are ignored.
    fn into_completion(self) -> Completion {
        let text = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        Completion {
            text,
            model: self.model,
            usage: self.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_carries_system_and_prompt() {
        let provider = AnthropicProvider::with_model("key", "claude-3-haiku").expect("provider");
        let body = provider.body(
            &CompletionRequest::new("Is this page blocked?")
                .with_system("JSON only")
                .with_max_tokens(1000),
        );

        assert_eq!(body["model"], "claude-3-haiku");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "JSON only");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Is this page blocked?");
    }

    #[test]
    fn test_body_without_system() {
        let provider = AnthropicProvider::new("key").expect("provider");
        let body = provider.body(&CompletionRequest::new("hi"));
        assert!(body.get("system").is_none());
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_text_blocks_joined() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "{\"blocking_detected\":"},
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "false}"}
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let message: MessageResponse = serde_json::from_str(raw).expect("parse response");
        let completion = message.into_completion();

        assert_eq!(completion.text, "{\"blocking_detected\":\nfalse}");
        assert_eq!(completion.usage.map(|u| u.total()), Some(15));
    }
}
