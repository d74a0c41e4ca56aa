//! Cursor persistence
//!
//! A store holds exactly one cursor per deployment. Reads fall back to the
//! initial lookback cursor when nothing has been written yet; writes always
//! overwrite and stamp `updated_at`. Stores never retry.

mod dynamo;
mod file;
mod memory;

pub use dynamo::DynamoStateStore;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::error::{Result, SyncError};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Short description used in logs and errors, e.g. `file:/var/lib/roster/state.json`
    fn describe(&self) -> String;

    /// The persisted cursor, or the initial cursor if none exists.
    async fn read(&self) -> Result<Cursor>;

    /// Persist `cursor`, returning it as stored.
    async fn write(&self, cursor: &Cursor) -> Result<Cursor>;
}

/// Rebuild a cursor from stored fields. A missing watermark falls back to the
/// initial one; an offset that is present but not a non-negative integer is
/// rejected.
pub(crate) fn decode_cursor(
    store: &str,
    since: Option<String>,
    offset: Option<&str>,
    updated_at: Option<&str>,
    lookback_days: i64,
) -> Result<Cursor> {
    let watermark = match since {
        Some(since) if !since.trim().is_empty() => since,
        _ => Cursor::initial(Utc::now(), lookback_days).watermark,
    };

    let offset = match offset {
        None => 0,
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            SyncError::malformed(store, format!("offset {raw:?} is not a non-negative integer"))
        })?,
    };

    let mut cursor = Cursor::new(watermark, offset);
    cursor.updated_at = updated_at
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc));
    Ok(cursor)
}
