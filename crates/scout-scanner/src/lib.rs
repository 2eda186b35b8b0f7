//! Scout Scanner - Blocking-aware scraping controller.
//!
//! This crate drives one browser tab per (company, state) work item through an
//! advisor directory. Every page is classified before anything is extracted,
//! blocks are answered with bounded waits, and an entry URL that stops working
//! is rediscovered through web search instead of failing the item.
//!
//! # Features
//!
//! - Page classification: usable, CAPTCHA, rate limit, access denied, JS challenge, not found
//! - Retry policy with per-block-kind waits and give-up thresholds
//! - URL cache with single-flight rediscovery per key
//! - Pagination detection from page structure with a reasoning fallback
//! - Record extraction and normalization
//! - Cancellation that always preserves partial results
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_scanner::{JobRunner, SessionOrchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(SessionOrchestrator::new(resolver, classifier, reasoner, settings));
//! let runner = JobRunner::new(orchestrator, Arc::new(browser_engine), Arc::new(recorder));
//!
//! let report = runner.run(items, &cancel).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod classifier;
#[allow(missing_docs)]
pub mod error;
pub mod extraction;
#[allow(missing_docs)]
pub mod navigator;
pub mod orchestrator;
pub mod pagination;
pub mod policy;
pub mod resolver;
pub mod runner;
pub mod search;
pub mod verifier;

// Re-export commonly used types
pub use classifier::{PageClassifier, PageVerdict, VerdictKind};
pub use error::{ResolveError, Result, ScanError, SearchError};
pub use extraction::ExtractionEngine;
pub use navigator::StateSearchNavigator;
pub use orchestrator::{ItemOutcome, SessionOrchestrator};
pub use pagination::{NavigationInstruction, PaginationDriver, PaginationOutcome};
pub use policy::{decide, Action, Decision, RetryState};
pub use resolver::UrlResolver;
pub use runner::{JobRunner, RunReport};
pub use search::{DuckDuckGoSearch, SearchProvider};
pub use verifier::{BrowserVerifier, CandidateVerifier};
