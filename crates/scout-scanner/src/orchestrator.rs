//! Session orchestrator: the per-item control loop.
//!
//! ```text
//! Resolving -> Fetching -> Classifying -> Extracting -> (Pacing -> Fetching)*
//!                              |
//!                              +-> Waiting -> Fetching
//!                              +-> Reresolving -> Fetching
//!                              +-> Terminating
//! ```
//!
//! Every exit path goes through `Terminating`, which finalizes a
//! [`JobResult`] with whatever records were accumulated.

use crate::classifier::{status_verdict, PageClassifier, PageVerdict, VerdictKind};
use crate::extraction::ExtractionEngine;
use crate::navigator::StateSearchNavigator;
use crate::pagination::{NavigationInstruction, PaginationDriver, PaginationOutcome};
use crate::policy::{decide, Action, RetryState};
use crate::resolver::UrlResolver;
use chrono::{DateTime, Utc};
use rand::Rng;
use scout_browser::{BrowserActions, BrowserError, PageContent};
use scout_core::{
    AdvisorRecord, JobResult, JobStats, ResolvedUrl, ScrapeSettings, TerminationReason, WorkItem,
    WorkItemKey,
};
use scout_llm::Reasoner;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Zero-record loads of page 0 in a row that mark the entry URL stale.
const STALE_ENTRY_EMPTY_LOADS: u32 = 2;

/// Result of one item loop.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// The finalized result
    pub result: JobResult,
    /// Set when the browser became unusable; the runner aborts the job
    pub fatal: Option<String>,
}

/// Runs the control loop for work items.
pub struct SessionOrchestrator {
    resolver: Arc<UrlResolver>,
    classifier: Arc<PageClassifier>,
    extractor: ExtractionEngine,
    navigator: StateSearchNavigator,
    reasoner: Arc<dyn Reasoner>,
    settings: ScrapeSettings,
}

impl SessionOrchestrator {
    /// Create an orchestrator. The reasoner backs extraction, state search
    /// and the pagination fallback.
    #[must_use]
    pub fn new(
        resolver: Arc<UrlResolver>,
        classifier: Arc<PageClassifier>,
        reasoner: Arc<dyn Reasoner>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            resolver,
            classifier,
            extractor: ExtractionEngine::new(reasoner.clone()),
            navigator: StateSearchNavigator::new(reasoner.clone()),
            reasoner,
            settings,
        }
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }

    /// The shared URL resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<UrlResolver> {
        &self.resolver
    }

    /// Drive one work item to termination using `browser` as its tab.
    pub async fn run(
        &self,
        item: &WorkItem,
        browser: &dyn BrowserActions,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        let key = item.key();
        tracing::info!(key = %key, "Starting work item");

        let mut item_loop = ItemLoop {
            orch: self,
            browser,
            cancel,
            retry: RetryState::new(key.clone()),
            key,
            records: Vec::new(),
            stats: JobStats::default(),
            entry: None,
            target: FetchTarget::Current,
            page_index: 0,
            empty_streak: 0,
            empty_entry_loads: 0,
            rediscoveries: 0,
            pagination: PaginationDriver::new(self.settings.max_pages_per_state)
                .with_reasoner(self.reasoner.clone()),
            fatal: None,
            started_at: Utc::now(),
        };
        item_loop.drive().await
    }
}

/// What `Fetching` loads.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchTarget {
    /// Directory entry URL, followed by the state search
    Entry(String),
    /// A next-page link
    Link(String),
    /// A next-page control on the current page
    Click(String),
    /// Re-read the current page
    Current,
}

enum Phase {
    Resolving,
    Fetching,
    Classifying(PageContent),
    Extracting(PageContent),
    Waiting(Duration),
    Pacing(Duration),
    Reresolving,
    Terminating(TerminationReason),
}

struct ItemLoop<'a> {
    orch: &'a SessionOrchestrator,
    browser: &'a dyn BrowserActions,
    cancel: &'a CancellationToken,
    key: WorkItemKey,
    retry: RetryState,
    records: Vec<AdvisorRecord>,
    stats: JobStats,
    entry: Option<ResolvedUrl>,
    target: FetchTarget,
    page_index: u32,
    empty_streak: u32,
    empty_entry_loads: u32,
    rediscoveries: u32,
    pagination: PaginationDriver,
    fatal: Option<String>,
    started_at: DateTime<Utc>,
}

impl ItemLoop<'_> {
    async fn drive(&mut self) -> ItemOutcome {
        let mut phase = Phase::Resolving;
        let reason = loop {
            if self.cancel.is_cancelled() && !matches!(phase, Phase::Terminating(_)) {
                tracing::warn!(key = %self.key, "Interrupted; finalizing partial result");
                phase = Phase::Terminating(TerminationReason::Interrupted);
            }

            phase = match phase {
                Phase::Terminating(reason) => break reason,
                Phase::Resolving => self.resolving().await,
                Phase::Fetching => self.fetching().await,
                Phase::Classifying(page) => self.classifying(page).await,
                Phase::Extracting(page) => self.extracting(page).await,
                Phase::Waiting(delay) => self.waiting(delay).await,
                Phase::Pacing(delay) => self.pacing(delay).await,
                Phase::Reresolving => self.reresolving().await,
            };
        };
        self.finish(reason)
    }

    async fn resolving(&mut self) -> Phase {
        match self.orch.resolver.resolve(&self.key).await {
            Ok(entry) => {
                tracing::info!(
                    key = %self.key,
                    url = %entry.url,
                    source = entry.source.as_str(),
                    "Entry URL resolved"
                );
                self.use_entry(entry);
                Phase::Fetching
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "No entry URL available");
                Phase::Terminating(TerminationReason::FatalAbort)
            }
        }
    }

    fn use_entry(&mut self, entry: ResolvedUrl) {
        self.target = FetchTarget::Entry(entry.url.clone());
        self.entry = Some(entry);
        self.page_index = 0;
        self.empty_streak = 0;
        self.empty_entry_loads = 0;
        self.pagination.reset();
    }

    async fn fetching(&mut self) -> Phase {
        self.stats.fetch_attempts += 1;
        let target = self.target.clone();
        tracing::debug!(
            key = %self.key,
            page = self.page_index + 1,
            attempt = self.retry.attempt_count + 1,
            ?target,
            "Fetching"
        );

        let fetched = match &target {
            FetchTarget::Entry(url) => self.load_entry(url).await,
            FetchTarget::Link(url) => self.browser.navigate(url).await,
            FetchTarget::Click(selector) => {
                // A retry re-reads the page instead of clicking again
                self.target = FetchTarget::Current;
                match self.browser.click(selector).await {
                    Ok(()) => self.browser.current_content().await,
                    Err(BrowserError::SelectorNotFound(_)) => {
                        tracing::info!(
                            key = %self.key,
                            selector = %selector,
                            "Next-page control vanished; listing complete"
                        );
                        return Phase::Terminating(TerminationReason::Completed);
                    }
                    Err(e) => Err(e),
                }
            }
            FetchTarget::Current => self.browser.current_content().await,
        };

        match fetched {
            Ok(page) => Phase::Classifying(page),
            Err(e) if e.is_fatal() => {
                tracing::error!(key = %self.key, error = %e, "Browser unusable");
                self.fatal = Some(e.to_string());
                Phase::Terminating(TerminationReason::FatalAbort)
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Fetch failed");
                self.blocked(PageVerdict::unreachable(&e))
            }
        }
    }

    /// Load the entry URL and search it for the item's state.
    async fn load_entry(&self, url: &str) -> Result<PageContent, BrowserError> {
        let landing = self.browser.navigate(url).await?;
        if status_verdict(landing.status).is_some() {
            return Ok(landing);
        }

        if self
            .orch
            .navigator
            .search_state(self.browser, &landing, &self.key.state)
            .await?
        {
            self.browser.current_content().await
        } else {
            Ok(landing)
        }
    }

    async fn classifying(&mut self, page: PageContent) -> Phase {
        let verdict = self.orch.classifier.classify(&page).await;
        tracing::info!(
            key = %self.key,
            page = self.page_index + 1,
            verdict = %verdict.kind,
            confidence = verdict.confidence,
            rationale = %verdict.rationale,
            "Page classified"
        );

        if verdict.is_usable() {
            self.retry = decide(&verdict, &self.retry, &self.orch.settings).next;
            Phase::Extracting(page)
        } else {
            self.blocked(verdict)
        }
    }

    fn blocked(&mut self, verdict: PageVerdict) -> Phase {
        if verdict.kind.is_block() {
            self.stats.blocks_encountered += 1;
        }

        let decision = decide(&verdict, &self.retry, &self.orch.settings);
        self.retry = decision.next;

        match decision.action {
            Action::Wait(delay) => {
                if verdict.kind == VerdictKind::CaptchaChallenge && !self.orch.settings.headless {
                    tracing::warn!(
                        key = %self.key,
                        wait_secs = delay.as_secs(),
                        "CAPTCHA detected: solve it in the browser window before the wait ends"
                    );
                }
                tracing::info!(
                    key = %self.key,
                    verdict = %verdict.kind,
                    attempt = self.retry.attempt_count,
                    consecutive_blocks = self.retry.consecutive_block_count,
                    wait_secs = delay.as_secs(),
                    "Backing off"
                );
                Phase::Waiting(delay)
            }
            Action::RetryNow | Action::Proceed => Phase::Fetching,
            Action::Reresolve => Phase::Reresolving,
            Action::GiveUp => {
                tracing::warn!(
                    key = %self.key,
                    verdict = %verdict.kind,
                    attempt = self.retry.attempt_count,
                    records = self.records.len(),
                    "Retries exhausted"
                );
                Phase::Terminating(TerminationReason::RetriesExhausted)
            }
        }
    }

    async fn waiting(&mut self, delay: Duration) -> Phase {
        let started = Instant::now();
        let completed = sleep_or_cancel(delay, self.cancel).await;
        self.retry.record_wait(started.elapsed());

        if completed {
            Phase::Fetching
        } else {
            Phase::Terminating(TerminationReason::Interrupted)
        }
    }

    async fn pacing(&mut self, delay: Duration) -> Phase {
        if sleep_or_cancel(delay, self.cancel).await {
            Phase::Fetching
        } else {
            Phase::Terminating(TerminationReason::Interrupted)
        }
    }

    async fn reresolving(&mut self) -> Phase {
        if self.rediscoveries >= self.orch.settings.max_rediscoveries {
            tracing::warn!(
                key = %self.key,
                rediscoveries = self.rediscoveries,
                "Rediscovery budget spent"
            );
            return Phase::Terminating(TerminationReason::RetriesExhausted);
        }

        self.orch.resolver.invalidate(&self.key);
        match self.orch.resolver.rediscover(&self.key).await {
            Ok(entry) => {
                self.rediscoveries += 1;
                self.stats.rediscoveries += 1;
                self.retry = self.retry.after_reresolve();
                tracing::info!(key = %self.key, url = %entry.url, "Switched to rediscovered entry URL");
                self.use_entry(entry);
                Phase::Fetching
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Rediscovery failed");
                Phase::Terminating(TerminationReason::RetriesExhausted)
            }
        }
    }

    async fn extracting(&mut self, page: PageContent) -> Phase {
        let settings = &self.orch.settings;
        if self.page_index > 0 && self.pagination.is_repeat(&page) {
            tracing::info!(
                key = %self.key,
                page = self.page_index + 1,
                "Next page shows the previous content; listing complete"
            );
            return Phase::Terminating(TerminationReason::Completed);
        }
        self.stats.pages_visited += 1;
        tracing::info!(key = %self.key, page = self.page_index + 1, url = %page.url, "Scraping page");

        let found = self.orch.extractor.extract(&page, self.key.company).await;

        if found.is_empty() {
            if self.page_index == 0 {
                self.empty_entry_loads += 1;
                if self.empty_entry_loads >= STALE_ENTRY_EMPTY_LOADS {
                    self.empty_entry_loads = 0;
                    if self.rediscoveries < settings.max_rediscoveries {
                        tracing::warn!(key = %self.key, "Entry URL keeps yielding nothing; treating it as stale");
                        return Phase::Reresolving;
                    }
                    tracing::info!(key = %self.key, "No advisors listed");
                    return Phase::Terminating(TerminationReason::Completed);
                }
                return Phase::Pacing(self.politeness_delay());
            }

            self.empty_streak += 1;
            tracing::warn!(
                key = %self.key,
                page = self.page_index + 1,
                streak = self.empty_streak,
                "No advisors on page"
            );
            if self.empty_streak >= settings.max_empty_pages {
                tracing::info!(key = %self.key, "Stopping after consecutive empty pages");
                return Phase::Terminating(TerminationReason::Completed);
            }
        } else {
            self.empty_streak = 0;
            self.empty_entry_loads = 0;
            let room = settings
                .max_advisors_per_item
                .saturating_sub(self.records.len());
            self.records.extend(found.into_iter().take(room));
            if self.records.len() >= settings.max_advisors_per_item {
                tracing::info!(key = %self.key, records = self.records.len(), "Record limit reached");
                return Phase::Terminating(TerminationReason::RecordLimitReached);
            }
        }

        match self.pagination.inspect(&page, self.page_index).await {
            PaginationOutcome::Next(instruction) => {
                self.page_index += 1;
                self.target = match instruction {
                    NavigationInstruction::FollowLink(url) => FetchTarget::Link(url),
                    NavigationInstruction::Click(selector) => FetchTarget::Click(selector),
                };
                Phase::Pacing(self.politeness_delay())
            }
            PaginationOutcome::LimitReached => Phase::Terminating(TerminationReason::PageLimitReached),
            PaginationOutcome::End => Phase::Terminating(TerminationReason::Completed),
        }
    }

    fn politeness_delay(&self) -> Duration {
        let settings = &self.orch.settings;
        let low = millis(settings.min_delay.min(settings.max_delay));
        let high = millis(settings.min_delay.max(settings.max_delay));
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    fn finish(&mut self, termination: TerminationReason) -> ItemOutcome {
        let stats = JobStats {
            total_waited_secs: self.retry.total_waited_secs,
            ..self.stats.clone()
        };
        let result = JobResult {
            key: self.key.clone(),
            records: std::mem::take(&mut self.records),
            termination,
            entry_url: self.entry.as_ref().map(|e| e.url.clone()),
            stats,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            key = %result.key,
            termination = %result.termination,
            records = result.records.len(),
            pages = result.stats.pages_visited,
            blocks = result.stats.blocks_encountered,
            waited_secs = result.stats.total_waited_secs,
            "Work item finished"
        );

        ItemOutcome {
            result,
            fatal: self.fatal.take(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Sleep for `delay`; returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_completes() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(30), &cancel).await);
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_interrupted() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(300), &cancel).await);
        assert!(started.elapsed() < Duration::from_secs(300));
    }
}
