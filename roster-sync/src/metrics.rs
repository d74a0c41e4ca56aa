//! Per-run outcome counters and the summary emitted at exit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::policy::RecordOutcome;

/// Aggregate result of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier, also attached to every log line of the run
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Cursor the run started from
    pub since: String,
    pub offset: u64,
    pub batch_size: i64,
    /// Records in the fetched change page
    pub total_changed: usize,
    /// `created + updated + suspended`
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub suspended: usize,
    pub skipped_no_email: usize,
    pub skipped_invalid_email: usize,
    pub skipped_deleted: usize,
    /// Per-record and run-level errors
    pub errors: usize,
    /// High-water mark reported by the feed (the start watermark if none)
    pub latest: String,
    /// Cursor the next run starts from
    pub next_since: String,
    pub next_offset: u64,
    pub cursor_written: bool,
}

impl RunSummary {
    pub fn new(start: &Cursor, batch_size: i64, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            since: start.watermark.clone(),
            offset: start.offset,
            batch_size,
            total_changed: 0,
            processed: 0,
            created: 0,
            updated: 0,
            suspended: 0,
            skipped_no_email: 0,
            skipped_invalid_email: 0,
            skipped_deleted: 0,
            errors: 0,
            latest: start.watermark.clone(),
            next_since: start.watermark.clone(),
            next_offset: start.offset,
            cursor_written: false,
        }
    }

    pub fn record_outcome(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Suspended => self.suspended += 1,
            RecordOutcome::SkippedDeleted => self.skipped_deleted += 1,
            RecordOutcome::SkippedNoEmail => self.skipped_no_email += 1,
            RecordOutcome::SkippedInvalidEmail => self.skipped_invalid_email += 1,
        }
        if outcome.is_processed() {
            self.processed += 1;
        }
    }

    /// Count a failure outside the per-record loop.
    pub fn record_run_error(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        error!(
            run_id = %self.run_id,
            stage,
            error = %message,
            "Run failed, cursor left unchanged"
        );
        self.errors += 1;
    }

    pub fn set_next(&mut self, cursor: &Cursor) {
        self.next_since = cursor.watermark.clone();
        self.next_offset = cursor.offset;
    }

    /// Mark the run as finished and log the totals.
    pub fn complete(&mut self) {
        let finished_at = Utc::now();
        self.finished_at = Some(finished_at);

        let duration = finished_at - self.started_at;
        info!(
            run_id = %self.run_id,
            duration_secs = duration.num_milliseconds() as f64 / 1000.0,
            dry_run = self.dry_run,
            since = %self.since,
            offset = self.offset,
            total_changed = self.total_changed,
            processed = self.processed,
            created = self.created,
            updated = self.updated,
            suspended = self.suspended,
            skipped_no_email = self.skipped_no_email,
            skipped_invalid_email = self.skipped_invalid_email,
            skipped_deleted = self.skipped_deleted,
            errors = self.errors,
            next_since = %self.next_since,
            next_offset = self.next_offset,
            cursor_written = self.cursor_written,
            "Reconciliation run completed"
        );
    }

    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    /// Process exit code: 0 only when nothing failed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// The summary as a single JSON line, keys sorted
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let fields: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(serde_json::to_value(self)?)?;
        serde_json::to_string(&fields)
    }
}
