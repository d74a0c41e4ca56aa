//! Resumable position in the change feed
//!
//! A [`Cursor`] pairs the watermark a change page was requested with and the
//! number of records of that page already reconciled. A run reads it once,
//! reconciles at most one window of the page, and then either advances it or
//! retains it unchanged so the next run re-presents the same window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Format of watermarks the engine generates itself
pub const WATERMARK_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Timestamp string passed to the change feed as `since`
    pub watermark: String,
    /// Records of the current watermark's page already reconciled
    pub offset: u64,
    /// When the cursor was last persisted; set by the state store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cursor {
    pub fn new(watermark: impl Into<String>, offset: u64) -> Self {
        Self {
            watermark: watermark.into(),
            offset,
            updated_at: None,
        }
    }

    /// Starting cursor for a deployment with no persisted state.
    pub fn initial(now: DateTime<Utc>, lookback_days: i64) -> Self {
        let since = now - Duration::days(lookback_days.max(0));
        Self::new(since.format(WATERMARK_FORMAT).to_string(), 0)
    }

    /// `(watermark, offset)`, ignoring persistence metadata
    pub fn position(&self) -> (&str, u64) {
        (&self.watermark, self.offset)
    }

    pub fn same_position(&self, other: &Cursor) -> bool {
        self.position() == other.position()
    }

    pub(crate) fn stamped(&self, at: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(at),
            ..self.clone()
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.watermark, self.offset)
    }
}

/// How many change records one run may reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchLimit {
    Bounded(usize),
    /// The rest of the page
    Unbounded,
}

impl BatchLimit {
    /// Interpret a configured batch size; zero or negative means unbounded.
    pub fn from_configured(size: i64) -> Self {
        match usize::try_from(size) {
            Ok(0) | Err(_) => BatchLimit::Unbounded,
            Ok(size) => BatchLimit::Bounded(size),
        }
    }
}

/// Phases of one run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Enriching,
    ProcessingBatch,
    Advancing,
    Retaining,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Enriching => "enriching",
            RunPhase::ProcessingBatch => "processing_batch",
            RunPhase::Advancing => "advancing",
            RunPhase::Retaining => "retaining",
        };
        f.write_str(name)
    }
}

/// Where the cursor goes at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorDecision {
    Advance(Cursor),
    Retain(Cursor),
}

impl CursorDecision {
    pub fn cursor(&self) -> &Cursor {
        match self {
            CursorDecision::Advance(cursor) | CursorDecision::Retain(cursor) => cursor,
        }
    }

    pub fn into_cursor(self) -> Cursor {
        match self {
            CursorDecision::Advance(cursor) | CursorDecision::Retain(cursor) => cursor,
        }
    }

    pub fn phase(&self) -> RunPhase {
        match self {
            CursorDecision::Advance(_) => RunPhase::Advancing,
            CursorDecision::Retain(_) => RunPhase::Retaining,
        }
    }
}

/// The slice of a page of `total` records this run should reconcile, or
/// `None` when the page is empty or already fully consumed.
pub fn plan_window(cursor: &Cursor, total: usize, limit: BatchLimit) -> Option<Range<usize>> {
    let start = usize::try_from(cursor.offset).unwrap_or(usize::MAX);
    if total == 0 || start >= total {
        return None;
    }

    let end = match limit {
        BatchLimit::Unbounded => total,
        BatchLimit::Bounded(size) => start.saturating_add(size).min(total),
    };
    Some(start..end)
}

/// Decide the next cursor once the run knows what happened.
///
/// `window` is what [`plan_window`] returned. Any caught error retains the
/// cursor; otherwise it moves within the page or on to `latest`.
pub fn settle(
    cursor: &Cursor,
    window: Option<&Range<usize>>,
    total: usize,
    latest: &str,
    errors: usize,
) -> CursorDecision {
    let Some(window) = window else {
        return CursorDecision::Advance(Cursor::new(latest, 0));
    };

    if errors > 0 {
        return CursorDecision::Retain(Cursor::new(cursor.watermark.clone(), cursor.offset));
    }

    if window.end < total {
        CursorDecision::Advance(Cursor::new(cursor.watermark.clone(), window.end as u64))
    } else {
        CursorDecision::Advance(Cursor::new(latest, 0))
    }
}
