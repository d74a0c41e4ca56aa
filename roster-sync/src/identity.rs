//! Mapping of raw directory attributes onto a canonical identity
//!
//! Everything here is pure: the same `(external_id, action, record)` always
//! resolves to the same [`Identity`].

use regex::Regex;
use roster_core::{ChangeAction, DirectoryRecord};
use serde::Serialize;
use std::sync::LazyLock;

/// Prefix of every provisioned username; the rest is the external id.
pub const USERNAME_PREFIX: &str = "bamboo_";

const STATUS_KEYS: &[&str] = &["employmenthistorystatus", "status", "employmentstatus"];
const INACTIVE_MARKERS: &[&str] = &["terminated", "inactive", "disabled", "deceased"];

const FIRST_NAME_KEYS: &[&str] = &["preferredname", "firstname"];
const EMAIL_KEYS: &[&str] = &["workemail", "email", "homeemail"];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Canonical view of one source entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub external_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Lowercased, or empty when the record has no email
    pub email: String,
    pub department: Option<String>,
    pub is_inactive: bool,
}

impl Identity {
    pub fn has_valid_email(&self) -> bool {
        is_valid_email(&self.email)
    }
}

/// Whether the entity should be suspended (or never provisioned).
pub fn is_inactive(action: ChangeAction, record: &DirectoryRecord) -> bool {
    if action == ChangeAction::Deleted {
        return true;
    }

    let status = record.first_non_empty(STATUS_KEYS).to_lowercase();
    INACTIVE_MARKERS.iter().any(|marker| status.contains(marker))
}

pub fn resolve_identity(
    external_id: &str,
    action: ChangeAction,
    record: &DirectoryRecord,
) -> Identity {
    let mut first_name = record.first_non_empty(FIRST_NAME_KEYS).to_string();
    let mut last_name = record.first_non_empty(&["lastname"]).to_string();

    if first_name.is_empty() || last_name.is_empty() {
        let (fallback_first, fallback_last) = split_name(record.first_non_empty(&["displayname"]));
        if first_name.is_empty() {
            first_name = fallback_first;
        }
        if last_name.is_empty() {
            last_name = fallback_last;
        }
    }

    let department = record.first_non_empty(&["department"]);

    Identity {
        external_id: external_id.to_string(),
        username: username_for(external_id),
        first_name,
        last_name,
        email: record.first_non_empty(EMAIL_KEYS).to_lowercase(),
        department: (!department.is_empty()).then(|| department.to_string()),
        is_inactive: is_inactive(action, record),
    }
}

/// Split a display name into first and last tokens.
///
/// A single token gets the last name `User`; an empty name is `Unknown User`.
pub fn split_name(display_name: &str) -> (String, String) {
    let parts: Vec<&str> = display_name.split_whitespace().collect();
    match parts.as_slice() {
        [] => ("Unknown".to_string(), "User".to_string()),
        [only] => (only.to_string(), "User".to_string()),
        [first, .., last] => (first.to_string(), last.to_string()),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn username_for(external_id: &str) -> String {
    format!("{USERNAME_PREFIX}{external_id}")
}
