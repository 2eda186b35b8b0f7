use scout_core::{Company, WorkItemKey};
use thiserror::Error;

/// Failures of the URL resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no viable directory URL for {company} / {state} after examining {examined} candidates")]
    DiscoveryExhausted {
        company: Company,
        state: String,
        examined: usize,
    },

    #[error("URL cache store error: {0}")]
    Store(#[from] scout_db::DatabaseError),
}

/// Failures of the search collaborator.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search unavailable: {0}")]
    Unavailable(String),

    #[error("failed to parse search results: {0}")]
    Parse(String),
}

/// Errors surfaced by the job runner.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The browser became unusable; every in-flight item has been finalized.
    #[error("fatal abort while scraping {key}: {reason}")]
    FatalAbort { key: WorkItemKey, reason: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;
