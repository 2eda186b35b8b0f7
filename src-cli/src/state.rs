//! Application state: the collaborators shared by one run.

use crate::summary::RunSummary;
use anyhow::{Context, Result};
use scout_browser::BrowserEngine;
use scout_core::AppConfig;
use scout_db::{export::file_timestamp, export_run, job_results, Database, RunRecorder};
use scout_llm::{LlmReasoner, LlmRouter, Reasoner};
use scout_scanner::{
    BrowserVerifier, DuckDuckGoSearch, JobRunner, PageClassifier, SessionOrchestrator, UrlResolver,
};
use std::sync::Arc;
use std::time::Duration;

/// Everything a run needs, wired once at startup.
pub struct AppState {
    config: AppConfig,
    db: Arc<Database>,
    recorder: Arc<RunRecorder>,
    browser: Arc<BrowserEngine>,
    resolver: Arc<UrlResolver>,
    orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    /// Open the database, register the run, launch the browser and warm the URL cache.
    pub async fn init(config: AppConfig, mode: &str) -> Result<Self> {
        std::fs::create_dir_all(&config.output.directory).with_context(|| {
            format!(
                "failed to create output directory {}",
                config.output.directory.display()
            )
        })?;

        let db_path = config.output.database_path();
        let db = Arc::new(
            Database::new(&db_path)
                .await
                .with_context(|| format!("failed to open database {}", db_path.display()))?,
        );
        let recorder = Arc::new(RunRecorder::start(db.clone(), mode).await?);
        tracing::info!(run_id = recorder.run_id(), mode, "Run registered");

        let router = Arc::new(LlmRouter::from_config(&config.llm).context("no usable LLM provider")?);
        let reasoner: Arc<dyn Reasoner> = Arc::new(LlmReasoner::from_config(router, &config.llm));

        let browser = Arc::new(
            BrowserEngine::launch(&config.browser)
                .await
                .context("failed to launch browser")?,
        );

        let classifier = Arc::new(PageClassifier::new(reasoner.clone()));
        let search = Arc::new(DuckDuckGoSearch::new(Duration::from_secs(
            config.browser.navigation_timeout_secs,
        ))?);
        let verifier = Arc::new(BrowserVerifier::new(
            browser.clone(),
            classifier.clone(),
            reasoner.clone(),
        ));
        let resolver = Arc::new(
            UrlResolver::new(recorder.clone(), search, reasoner.clone(), verifier)
                .with_max_candidates(config.discovery.max_candidates),
        );
        resolver.warm().await?;

        let orchestrator = Arc::new(SessionOrchestrator::new(
            resolver.clone(),
            classifier,
            reasoner,
            config.scrape_settings(),
        ));

        Ok(Self {
            config,
            db,
            recorder,
            browser,
            resolver,
            orchestrator,
        })
    }

    /// The shared URL resolver.
    pub fn resolver(&self) -> &Arc<UrlResolver> {
        &self.resolver
    }

    /// A job runner persisting into this run.
    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            self.orchestrator.clone(),
            self.browser.clone(),
            self.recorder.clone(),
        )
    }

    /// Finish the run, export its records and release the browser.
    pub async fn close(self) -> Result<RunSummary> {
        self.browser.shutdown().await;
        self.recorder.finish().await?;

        let run_id = self.recorder.run_id();
        let jobs = job_results::list_job_summaries(self.db.pool(), run_id).await?;
        let export = export_run(&self.db, run_id, &self.config.output, &file_timestamp())
            .await
            .context("export failed")?;

        self.db.close().await;
        Ok(RunSummary::new(&jobs, export))
    }
}
