//! Reconciliation engine that drives one resumable run
//!
//! A run reads the cursor, fetches the change page for its watermark,
//! enriches the current window from a directory snapshot, reconciles each
//! record independently, and finally advances or retains the cursor.

use roster_core::{ChangeFeed, DirectoryRecord, DirectorySource, TargetDirectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::cursor::{plan_window, settle, BatchLimit, Cursor, RunPhase};
use crate::error::Result;
use crate::identity::resolve_identity;
use crate::metrics::RunSummary;
use crate::policy::Reconciler;
use crate::state::StateStore;

pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Options for reconciliation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Records reconciled per run; zero or negative means the whole page
    pub batch_size: i64,
    /// Look up users but issue no target writes and leave the cursor alone
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }
}

pub struct ReconciliationEngine {
    feed: Arc<dyn ChangeFeed>,
    directory: Arc<dyn DirectorySource>,
    reconciler: Reconciler,
    state: Arc<dyn StateStore>,
    options: EngineOptions,
}

impl ReconciliationEngine {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        directory: Arc<dyn DirectorySource>,
        target: Arc<dyn TargetDirectory>,
        state: Arc<dyn StateStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            feed,
            directory,
            reconciler: Reconciler::new(target, options.dry_run),
            state,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Execute one run.
    ///
    /// Only a failure to read the cursor is returned as an error. Everything
    /// after that is folded into the summary, whose `errors` count decides
    /// the exit status.
    pub async fn run(&self) -> Result<RunSummary> {
        enter(RunPhase::Idle);
        let start = self.state.read().await?;

        let summary = RunSummary::new(&start, self.options.batch_size, self.options.dry_run);
        let span = tracing::info_span!("run", run_id = %summary.run_id);

        Ok(self.run_from(start, summary).instrument(span).await)
    }

    async fn run_from(&self, start: Cursor, mut summary: RunSummary) -> RunSummary {
        info!(
            cursor = %start,
            store = %self.state.describe(),
            batch_size = self.options.batch_size,
            dry_run = self.options.dry_run,
            "Starting reconciliation run"
        );

        enter(RunPhase::Fetching);
        let page = match self.feed.fetch_changes(&start.watermark).await {
            Ok(page) => page,
            Err(e) => {
                summary.record_run_error("fetch_changes", e.to_string());
                summary.complete();
                return summary;
            }
        };
        summary.total_changed = page.total();
        summary.latest = page.latest.clone();

        let limit = BatchLimit::from_configured(self.options.batch_size);
        let window = plan_window(&start, page.total(), limit);
        let mut record_errors = 0usize;

        if let Some(range) = &window {
            enter(RunPhase::Enriching);
            let snapshot = match self.directory.fetch_directory().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    summary.record_run_error("fetch_directory", e.to_string());
                    summary.complete();
                    return summary;
                }
            };

            enter(RunPhase::ProcessingBatch);
            debug!(start = range.start, end = range.end, total = page.total(), "Processing window");

            let empty = DirectoryRecord::new();
            for record in &page.records[range.clone()] {
                let attributes = snapshot.get(&record.external_id).unwrap_or(&empty);
                let identity = resolve_identity(&record.external_id, record.action, attributes);

                match self.reconciler.reconcile(&identity).await {
                    Ok(outcome) => {
                        debug!(external_id = %record.external_id, outcome = %outcome, "Record reconciled");
                        summary.record_outcome(outcome);
                    }
                    Err(e) => {
                        record_errors += 1;
                        summary.errors += 1;
                        error!(
                            record = %serde_json::to_string(record).unwrap_or_default(),
                            error = %e,
                            "Record processing failed"
                        );
                    }
                }
            }
        } else {
            debug!(total = page.total(), offset = start.offset, "Nothing to reconcile in this page");
        }

        let decision = settle(&start, window.as_ref(), page.total(), &page.latest, record_errors);
        enter(decision.phase());

        if self.options.dry_run {
            info!(next = %decision.cursor(), "DRY RUN: cursor not written");
            summary.set_next(decision.cursor());
        } else {
            match self.state.write(decision.cursor()).await {
                Ok(stored) => {
                    summary.set_next(&stored);
                    summary.cursor_written = true;
                }
                Err(e) => {
                    summary.record_run_error("write_cursor", e.to_string());
                }
            }
        }

        if record_errors > 0 {
            warn!(
                errors = record_errors,
                cursor = %start,
                "Window had failures, cursor pinned for retry"
            );
        }

        summary.complete();
        summary
    }
}

fn enter(phase: RunPhase) {
    debug!(phase = %phase, "Run phase");
}
