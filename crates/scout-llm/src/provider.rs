//! Completion backends.
//!
//! The scanner only ever asks single-turn questions: fixed instructions, one
//! prompt with page content appended, a JSON object expected back. Providers
//! therefore take one [`CompletionRequest`] and return one [`Completion`].

use crate::error::Result;
use async_trait::async_trait;

/// Default completion token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A model backend. One instance is shared by every running work item.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Model the backend is configured with.
    fn model(&self) -> &str;

    /// Whether the model runs on this machine.
    fn is_local(&self) -> bool {
        false
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Standing instructions
    pub system: Option<String>,
    /// The question, page content included
    pub prompt: String,
    /// Completion token budget
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl CompletionRequest {
    /// Deterministic request for `prompt`.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
        }
    }

    /// Attach standing instructions.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the completion token budget.
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
}

/// Text produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Model that produced it
    pub model: String,
    /// Token accounting, when the backend reports it
    pub usage: Option<Usage>,
}

/// Token usage of one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Generated tokens
    pub output_tokens: u32,
}

impl Usage {
    /// Prompt plus generated tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}
