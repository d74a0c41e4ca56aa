use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{decode_cursor, StateStore};
use crate::cursor::Cursor;
use crate::error::{Result, SyncError};

#[derive(Debug, Serialize)]
struct StateDocument {
    #[serde(rename = "StateId")]
    state_id: String,
    since: String,
    offset: u64,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

/// Cursor kept as a small JSON document on local disk
pub struct FileStateStore {
    path: PathBuf,
    state_id: String,
    lookback_days: i64,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>, state_id: impl Into<String>, lookback_days: i64) -> Self {
        Self {
            path: path.into(),
            state_id: state_id.into(),
            lookback_days,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn read(&self) -> Result<Cursor> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, using initial cursor");
                return Ok(Cursor::initial(Utc::now(), self.lookback_days));
            }
            Err(e) => return Err(e.into()),
        };

        let store = self.describe();
        let document: Value = serde_json::from_str(&content)
            .map_err(|e| SyncError::malformed(&store, e.to_string()))?;
        let Value::Object(fields) = document else {
            return Err(SyncError::malformed(&store, "state document is not an object"));
        };

        let since = match fields.get("since") {
            None | Some(Value::Null) => None,
            Some(Value::String(since)) => Some(since.clone()),
            Some(other) => {
                return Err(SyncError::malformed(&store, format!("since {other} is not a string")))
            }
        };
        let offset = match fields.get("offset") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(SyncError::malformed(&store, format!("offset {other} is not a number")))
            }
        };
        let updated_at = fields.get("updatedAt").and_then(Value::as_str);

        decode_cursor(&store, since, offset.as_deref(), updated_at, self.lookback_days)
    }

    async fn write(&self, cursor: &Cursor) -> Result<Cursor> {
        let stored = cursor.stamped(Utc::now());
        let document = StateDocument {
            state_id: self.state_id.clone(),
            since: stored.watermark.clone(),
            offset: stored.offset,
            updated_at: stored.updated_at.unwrap_or_else(Utc::now),
        };
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Watermark and offset land together or not at all.
        let temp_path = self.temp_path();
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(path = %self.path.display(), cursor = %stored, "Cursor written");
        Ok(stored)
    }
}
