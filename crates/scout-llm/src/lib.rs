//! Scout LLM - reasoning collaborator for the scraping controller.
//!
//! This crate wraps several LLM backends behind one provider trait and exposes
//! the narrow [`Reasoner`] seam the scanner depends on: a prompt plus page
//! content in, a structured JSON judgment out.
//!
//! # Features
//!
//! - **Provider Abstraction**: Unified trait for Anthropic, `OpenAI` and Ollama
//! - **Failover Routing**: Try providers in preference order until one answers
//! - **Structured Judgments**: JSON extraction from free-form model output
//! - **Bounded Calls**: Content truncation and per-call timeout
//!
//! # Example
//!
//! ```rust,no_run
//! use scout_llm::{LlmReasoner, LlmRouter, OllamaProvider, Reasoner, RoutingPreference};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut router = LlmRouter::new(RoutingPreference::Ordered);
//! router.add_provider(Arc::new(OllamaProvider::new()?));
//!
//! let reasoner = LlmReasoner::new(Arc::new(router))
//!     .with_timeout(Duration::from_secs(30))
//!     .with_max_content_chars(4000);
//!
//! let judgment = reasoner
//!     .reason("Is this page blocked? Answer as JSON {\"is_blocked\": bool}", "<html>...</html>")
//!     .await?;
//! println!("blocked: {:?}", judgment.bool_field("is_blocked"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod provider;
pub mod providers;
pub mod reasoning;
pub mod router;

// Re-export commonly used types
pub use error::{LlmError, Result};
pub use provider::{Completion, CompletionRequest, LlmProvider, Usage};
pub use providers::{AnthropicProvider, OllamaProvider, OpenAiProvider};
pub use reasoning::{extract_json_object, truncate_chars, Judgment, LlmReasoner, Reasoner};
pub use router::{LlmRouter, RoutingPreference};
