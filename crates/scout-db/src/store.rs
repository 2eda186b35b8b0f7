//! Storage seams used by the scanning crate.
//!
//! The scanner only sees [`UrlCacheStore`] and [`ResultSink`]; the `SQLite`
//! implementation is [`RunRecorder`], and [`MemoryStore`] backs tests and
//! dry runs.

use crate::error::Result;
use crate::{job_results, url_cache, Database};
use async_trait::async_trait;
use scout_core::{JobResult, ResolvedUrl};
use std::sync::{Arc, Mutex, PoisonError};

/// Durable storage for resolved directory entry points.
#[async_trait]
pub trait UrlCacheStore: Send + Sync {
    /// Every persisted entry.
    async fn load_all(&self) -> Result<Vec<ResolvedUrl>>;

    /// Persist one entry, replacing any previous entry for the same key.
    async fn save(&self, entry: &ResolvedUrl) -> Result<()>;
}

/// Receiver of finalized job results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Accept one finalized result. Called exactly once per work item.
    async fn accept(&self, result: &JobResult) -> Result<()>;
}

/// Records one run into the database.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    db: Arc<Database>,
    run_id: String,
}

impl RunRecorder {
    /// Register a new run of the given mode.
    pub async fn start(db: Arc<Database>, mode: &str) -> Result<Self> {
        let run_id = job_results::start_run(db.pool(), mode).await?;
        tracing::info!(run_id = %run_id, mode, "Run started");
        Ok(Self { db, run_id })
    }

    /// Identifier of the recorded run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stamp the run as finished.
    pub async fn finish(&self) -> Result<()> {
        job_results::finish_run(self.db.pool(), &self.run_id).await?;
        tracing::info!(run_id = %self.run_id, "Run finished");
        Ok(())
    }
}

#[async_trait]
impl UrlCacheStore for RunRecorder {
    async fn load_all(&self) -> Result<Vec<ResolvedUrl>> {
        url_cache::list_urls(self.db.pool()).await
    }

    async fn save(&self, entry: &ResolvedUrl) -> Result<()> {
        url_cache::upsert_url(self.db.pool(), entry).await
    }
}

#[async_trait]
impl ResultSink for RunRecorder {
    async fn accept(&self, result: &JobResult) -> Result<()> {
        let job_id = job_results::insert_job_result(self.db.pool(), &self.run_id, result).await?;
        tracing::debug!(
            job_id = %job_id,
            key = %result.key,
            records = result.records.len(),
            termination = %result.termination,
            "Job result stored"
        );
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    urls: Mutex<Vec<ResolvedUrl>>,
    results: Mutex<Vec<JobResult>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with URL cache entries.
    #[must_use]
    pub fn with_urls(urls: Vec<ResolvedUrl>) -> Self {
        Self {
            urls: Mutex::new(urls),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the stored URL entries.
    #[must_use]
    pub fn urls(&self) -> Vec<ResolvedUrl> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the accepted results, in acceptance order.
    #[must_use]
    pub fn results(&self) -> Vec<JobResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl UrlCacheStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<ResolvedUrl>> {
        Ok(self.urls())
    }

    async fn save(&self, entry: &ResolvedUrl) -> Result<()> {
        let mut urls = self.urls.lock().unwrap_or_else(PoisonError::into_inner);
        urls.retain(|u| u.key != entry.key);
        urls.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl ResultSink for MemoryStore {
    async fn accept(&self, result: &JobResult) -> Result<()> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }
}
