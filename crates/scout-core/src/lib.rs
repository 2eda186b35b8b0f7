//! Scout Core - Foundation crate for the Scout advisor directory scraper.
//!
//! This crate provides the shared domain types, error handling and configuration
//! management that every other Scout crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and environment overrides
//! - [`types`] - Domain types (`Company`, `WorkItem`, `AdvisorRecord`, `JobResult`, ...)
//!
//! # Example
//!
//! ```rust
//! use scout_core::{AppConfig, Company, WorkItem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//!
//! let item = WorkItem::new(Company::Ubs, "New York");
//! println!("{} -> {}", item.key(), item.company.seed_url());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DiscoveryConfig, LlmConfig, OutputConfig, OutputFormat,
    ScrapeSettings, ScrapingConfig, TargetsConfig,
};
pub use error::{ConfigError, ConfigResult, Result, ScoutError};
pub use types::{
    AdvisorRecord, Company, JobResult, JobStats, ResolvedUrl, TerminationReason, UrlSource,
    WorkItem, WorkItemKey,
};
