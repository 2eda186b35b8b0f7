//! Job runner: fans work items out over browser tabs.

use crate::error::{Result, ScanError};
use crate::orchestrator::{ItemOutcome, SessionOrchestrator};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use scout_browser::SessionFactory;
use scout_core::{JobResult, JobStats, TerminationReason, WorkItem, WorkItemKey};
use scout_db::ResultSink;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a finished (or interrupted) run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One result per work item that was started
    pub results: Vec<JobResult>,
    /// Items never started because the run was cancelled or aborted
    pub skipped: Vec<WorkItemKey>,
}

impl RunReport {
    /// Total records across all results.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.results.iter().map(|r| r.records.len()).sum()
    }
}

/// Runs work items with bounded concurrency, one tab per item.
pub struct JobRunner {
    orchestrator: Arc<SessionOrchestrator>,
    sessions: Arc<dyn SessionFactory>,
    sink: Arc<dyn ResultSink>,
    concurrency: usize,
}

impl JobRunner {
    /// Create a runner; concurrency comes from the orchestrator's settings.
    #[must_use]
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        sessions: Arc<dyn SessionFactory>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let concurrency = orchestrator.settings().concurrent_items.max(1);
        Self {
            orchestrator,
            sessions,
            sink,
            concurrency,
        }
    }

    /// Override the number of items run at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run all items. Duplicate keys are skipped.
    ///
    /// Cancelling `cancel` interrupts running items, which still finalize
    /// and persist their partial results. A fatal browser failure cancels
    /// the remaining items the same way and is returned as
    /// [`ScanError::FatalAbort`] once everything in flight has drained.
    pub async fn run(&self, items: Vec<WorkItem>, cancel: &CancellationToken) -> Result<RunReport> {
        let abort = cancel.child_token();

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for item in items {
            let key = item.key();
            if seen.insert(key.clone()) {
                queue.push_back(item);
            } else {
                tracing::warn!(key = %key, "Skipping duplicate work item");
            }
        }

        tracing::info!(
            items = queue.len(),
            concurrency = self.concurrency,
            "Starting scrape run"
        );

        let mut in_flight = FuturesUnordered::new();
        let mut report = RunReport::default();
        let mut fatal: Option<(WorkItemKey, String)> = None;

        loop {
            while in_flight.len() < self.concurrency && !abort.is_cancelled() {
                let Some(item) = queue.pop_front() else {
                    break;
                };
                in_flight.push(self.run_item(item, abort.clone()));
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };

            if let Some(reason) = outcome.fatal {
                if fatal.is_none() {
                    tracing::error!(
                        key = %outcome.result.key,
                        reason = %reason,
                        "Fatal browser failure; aborting remaining items"
                    );
                    fatal = Some((outcome.result.key.clone(), reason));
                    abort.cancel();
                }
            }
            report.results.push(outcome.result);
        }

        report.skipped = queue.into_iter().map(|item| item.key()).collect();
        if !report.skipped.is_empty() {
            tracing::warn!(skipped = report.skipped.len(), "Work items not started");
        }

        if let Some((key, reason)) = fatal {
            return Err(ScanError::FatalAbort { key, reason });
        }

        tracing::info!(
            results = report.results.len(),
            records = report.record_count(),
            "Scrape run finished"
        );
        Ok(report)
    }

    async fn run_item(&self, item: WorkItem, cancel: CancellationToken) -> ItemOutcome {
        let started_at = Utc::now();
        let outcome = match self.sessions.open_session().await {
            Ok(session) => {
                let outcome = self.orchestrator.run(&item, session.as_ref(), &cancel).await;
                if let Err(e) = session.close().await {
                    tracing::debug!(key = %item.key(), error = %e, "Failed to close tab");
                }
                outcome
            }
            Err(e) => {
                tracing::error!(key = %item.key(), error = %e, "Failed to open browser tab");
                ItemOutcome {
                    result: JobResult {
                        key: item.key(),
                        records: Vec::new(),
                        termination: TerminationReason::FatalAbort,
                        entry_url: None,
                        stats: JobStats::default(),
                        started_at,
                        finished_at: Utc::now(),
                    },
                    fatal: Some(e.to_string()),
                }
            }
        };

        if let Err(e) = self.sink.accept(&outcome.result).await {
            tracing::error!(key = %outcome.result.key, error = %e, "Failed to persist job result");
        }
        outcome
    }
}
