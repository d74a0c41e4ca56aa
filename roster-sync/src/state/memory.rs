use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use super::StateStore;
use crate::cursor::Cursor;
use crate::error::{Result, SyncError};

/// In-process store, used by tests and for one-off runs that should not
/// touch shared state
pub struct MemoryStateStore {
    cursor: Mutex<Option<Cursor>>,
    writes: Mutex<usize>,
    lookback_days: i64,
}

impl MemoryStateStore {
    pub fn new(lookback_days: i64) -> Self {
        Self {
            cursor: Mutex::new(None),
            writes: Mutex::new(0),
            lookback_days,
        }
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor)),
            writes: Mutex::new(0),
            lookback_days: 0,
        }
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }

    /// The stored cursor, if any, without falling back to the initial one
    pub fn stored(&self) -> Option<Cursor> {
        self.cursor.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn read(&self) -> Result<Cursor> {
        let guard = self
            .cursor
            .lock()
            .map_err(|_| SyncError::store("memory", "cursor lock poisoned"))?;
        Ok(guard
            .clone()
            .unwrap_or_else(|| Cursor::initial(Utc::now(), self.lookback_days)))
    }

    async fn write(&self, cursor: &Cursor) -> Result<Cursor> {
        let stored = cursor.stamped(Utc::now());
        {
            let mut guard = self
                .cursor
                .lock()
                .map_err(|_| SyncError::store("memory", "cursor lock poisoned"))?;
            *guard = Some(stored.clone());
        }
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(stored)
    }
}
