use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

use super::{decode_cursor, StateStore};
use crate::cursor::{Cursor, WATERMARK_FORMAT};
use crate::error::{Result, SyncError};

const KEY_ATTRIBUTE: &str = "StateId";

/// Cursor kept as a single DynamoDB item keyed by `StateId`
pub struct DynamoStateStore {
    client: aws_sdk_dynamodb::Client,
    table: String,
    state_id: String,
    lookback_days: i64,
}

impl DynamoStateStore {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        table: impl Into<String>,
        state_id: impl Into<String>,
        lookback_days: i64,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            state_id: state_id.into(),
            lookback_days,
        }
    }

    fn key(&self) -> AttributeValue {
        AttributeValue::S(self.state_id.clone())
    }
}

#[async_trait]
impl StateStore for DynamoStateStore {
    fn describe(&self) -> String {
        format!("dynamodb:{}/{}", self.table, self.state_id)
    }

    async fn read(&self) -> Result<Cursor> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, self.key())
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| SyncError::store(self.describe(), format!("get_item failed: {e}")))?;

        match output.item() {
            Some(item) => cursor_from_item(&self.describe(), item, self.lookback_days),
            None => {
                debug!(table = %self.table, state_id = %self.state_id, "No state item yet, using initial cursor");
                Ok(Cursor::initial(Utc::now(), self.lookback_days))
            }
        }
    }

    async fn write(&self, cursor: &Cursor) -> Result<Cursor> {
        let stored = cursor.stamped(Utc::now());

        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item_for(&self.state_id, &stored)))
            .send()
            .await
            .map_err(|e| SyncError::store(self.describe(), format!("put_item failed: {e}")))?;

        debug!(table = %self.table, cursor = %stored, "Cursor written");
        Ok(stored)
    }
}

fn cursor_from_item(
    store: &str,
    item: &HashMap<String, AttributeValue>,
    lookback_days: i64,
) -> Result<Cursor> {
    let since = match item.get("since") {
        None => None,
        Some(value) => Some(
            value
                .as_s()
                .map_err(|_| SyncError::malformed(store, "since is not a string attribute"))?
                .clone(),
        ),
    };
    let offset = match item.get("offset") {
        None => None,
        Some(value) => Some(
            value
                .as_n()
                .map_err(|_| SyncError::malformed(store, "offset is not a number attribute"))?
                .as_str(),
        ),
    };
    let updated_at = item
        .get("updatedAt")
        .and_then(|value| value.as_s().ok())
        .map(String::as_str);

    decode_cursor(store, since, offset, updated_at, lookback_days)
}

fn item_for(state_id: &str, cursor: &Cursor) -> HashMap<String, AttributeValue> {
    let updated_at = cursor.updated_at.unwrap_or_else(Utc::now);
    HashMap::from([
        (KEY_ATTRIBUTE.to_string(), AttributeValue::S(state_id.to_string())),
        ("since".to_string(), AttributeValue::S(cursor.watermark.clone())),
        ("offset".to_string(), AttributeValue::N(cursor.offset.to_string())),
        (
            "updatedAt".to_string(),
            AttributeValue::S(updated_at.format(WATERMARK_FORMAT).to_string()),
        ),
    ])
}
