//! Roster Reconciliation Library
//!
//! A resumable, incremental reconciliation engine providing:
//! - A persisted cursor (watermark + in-page offset) and its state machine
//! - Pluggable cursor stores (DynamoDB, local file, in-memory)
//! - Deterministic identity resolution from raw directory records
//! - An idempotent per-record create/update/suspend/skip policy
//! - Run summaries with an exit status
//! - Dry-run capabilities

pub mod cursor;
pub mod engine;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod password;
pub mod policy;
pub mod state;

// Re-export main types and functions
pub use cursor::{BatchLimit, Cursor, CursorDecision, RunPhase};
pub use engine::{EngineOptions, ReconciliationEngine};
pub use error::{Result, SyncError};
pub use identity::{is_inactive, is_valid_email, resolve_identity, Identity};
pub use metrics::RunSummary;
pub use policy::{Reconciler, RecordOutcome};
pub use state::{DynamoStateStore, FileStateStore, MemoryStateStore, StateStore};

// Test modules
#[cfg(test)]
mod test_support;
