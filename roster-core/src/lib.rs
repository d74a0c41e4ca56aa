//! Core roster synchronization library
//!
//! This crate provides the data model shared by the reconciliation engine,
//! the adapter traits it is written against, and the HTTP adapters for
//! BambooHR (source) and Moodle (target).

pub mod api;
pub mod bamboohr;
pub mod moodle;

pub use api::{
    ApiError, ChangeAction, ChangeFeed, ChangePage, ChangeRecord, DirectoryRecord,
    DirectorySnapshot, DirectorySource, HttpClientBuilder, HttpSettings, NewUser, TargetDirectory,
    TargetUser, UserUpdate,
};
pub use bamboohr::{BambooHrClient, BambooHrConfig};
pub use moodle::{MoodleClient, MoodleConfig};
