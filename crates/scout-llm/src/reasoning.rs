//! The reasoning seam consumed by the scraping controller.
//!
//! Every semantic question the scanner asks (is this page blocked, which
//! candidate URL is the directory, which advisors are listed, how do I reach
//! the next page) goes through [`Reasoner::reason`]: a prompt and page content
//! in, a JSON object out. Callers own the safe default when a call fails.

use crate::error::{LlmError, Result};
use crate::provider::{CompletionRequest, DEFAULT_MAX_TOKENS};
use crate::router::LlmRouter;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid code fence regex")
});

const SYSTEM_PROMPT: &str = "You analyze web pages for an automated advisor directory scraper. \
Respond with a single JSON object and nothing else.";

/// Structured judgment returned by a reasoning call.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    fields: Map<String, Value>,
}

impl Judgment {
    /// Wrap a JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a judgment from any JSON value; non-objects yield `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field, trimmed; empty strings are treated as absent.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Boolean field, also accepting `"true"`/`"false"` strings.
    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().to_lowercase().parse().ok(),
            _ => None,
        }
    }

    /// Numeric field, also accepting numeric strings.
    #[must_use]
    pub fn f64_field(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Array field; a missing or non-array field yields an empty slice.
    #[must_use]
    pub fn array_field(&self, key: &str) -> &[Value] {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    /// Nested object field.
    #[must_use]
    pub fn object_field(&self, key: &str) -> Option<Judgment> {
        self.fields.get(key).cloned().and_then(Self::from_value)
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Reasoning collaborator: `reason(prompt, page_content) -> judgment`.
///
/// Implementations may fail (timeout, malformed output); they never retry on
/// their own.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Ask a question about a page and get a structured judgment back.
    async fn reason(&self, prompt: &str, page_content: &str) -> Result<Judgment>;
}

/// [`Reasoner`] backed by an [`LlmRouter`].
pub struct LlmReasoner {
    router: Arc<LlmRouter>,
    timeout: Duration,
    max_content_chars: usize,
    max_tokens: u32,
    temperature: f32,
}

impl LlmReasoner {
    /// Create a reasoner with a 60s timeout and 4000 characters of page content.
    #[must_use]
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self {
            router,
            timeout: Duration::from_secs(60),
            max_content_chars: 4000,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(router: Arc<LlmRouter>, config: &scout_core::LlmConfig) -> Self {
        Self::new(router)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_content_chars(config.max_content_chars)
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how much page content is sent per call.
    #[must_use]
    pub fn with_max_content_chars(mut self, max: usize) -> Self {
        self.max_content_chars = max;
        self
    }

    /// Set the completion token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, prompt: &str, page_content: &str) -> CompletionRequest {
        let content = truncate_chars(page_content, self.max_content_chars);
        let body = if content.is_empty() {
            prompt.to_string()
        } else {
            format!("{prompt}\n\nPage content:\n{content}")
        };

        CompletionRequest::new(body)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn reason(&self, prompt: &str, page_content: &str) -> Result<Judgment> {
        let request = self.build_request(prompt, page_content);

        let completion = tokio::time::timeout(self.timeout, self.router.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        let value = extract_json_object(&completion.text)?;
        Judgment::from_value(value)
            .ok_or_else(|| LlmError::MalformedJudgment("response is not a JSON object".into()))
    }
}

/// Truncate to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Recover the first JSON object from free-form model output.
///
/// Handles fenced code blocks and prose before or after the object.
pub fn extract_json_object(text: &str) -> Result<Value> {
    let body = CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let slice = balanced_object(body).ok_or_else(|| {
        LlmError::MalformedJudgment(format!(
            "no JSON object in response: {}",
            truncate_chars(text, 120)
        ))
    })?;

    serde_json::from_str(slice).map_err(|e| LlmError::MalformedJudgment(e.to_string()))
}

/// Slice of the first brace-balanced `{...}` span, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
