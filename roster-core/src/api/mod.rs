//! Adapter seams between the reconciliation engine and the outside world
//!
//! The engine only ever talks to these traits. Vendor modules implement them
//! and keep every wire-format detail to themselves.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::{truncate, HttpClientBuilder, HttpSettings};
pub use error::{ApiError, Result};
pub use types::*;

/// Source of "changed since" pages
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Fetch every change reported since `since`, plus the feed's new high-water mark.
    async fn fetch_changes(&self, since: &str) -> Result<ChangePage>;
}

/// Source of full directory snapshots
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn fetch_directory(&self) -> Result<DirectorySnapshot>;
}

/// The target identity system
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<TargetUser>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<TargetUser>>;

    async fn create_user(&self, user: &NewUser) -> Result<TargetUser>;

    /// Apply `update`. Any warning reported by the target is an error.
    async fn update_user(&self, update: &UserUpdate) -> Result<()>;
}
