use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// What the source system reports happened to an employee
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    #[default]
    Updated,
    Deleted,
    Unknown,
}

impl ChangeAction {
    /// Parse the feed's action code. A missing code means the record was updated.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty()
            || raw.eq_ignore_ascii_case("updated")
            || raw.eq_ignore_ascii_case("inserted")
        {
            ChangeAction::Updated
        } else if raw.eq_ignore_ascii_case("deleted") {
            ChangeAction::Deleted
        } else {
            ChangeAction::Unknown
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Updated => write!(f, "Updated"),
            ChangeAction::Deleted => write!(f, "Deleted"),
            ChangeAction::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One changed source entity since the watermark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub external_id: String,
    pub action: ChangeAction,
    pub changed_at: String,
}

impl ChangeRecord {
    pub fn new(
        external_id: impl Into<String>,
        action: ChangeAction,
        changed_at: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            action,
            changed_at: changed_at.into(),
        }
    }
}

/// A normalized page from the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePage {
    /// Changed records in source order
    pub records: Vec<ChangeRecord>,
    /// High-water mark the feed reported for this query
    pub latest: String,
}

impl ChangePage {
    pub fn new(records: Vec<ChangeRecord>, latest: impl Into<String>) -> Self {
        Self {
            records,
            latest: latest.into(),
        }
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }
}

/// Raw attributes of one source entity, keyed by lowercased attribute name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryRecord(BTreeMap<String, String>);

impl DirectoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(key.as_ref().trim().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// First trimmed, non-empty value among `keys`, or `""`.
    pub fn first_non_empty(&self, keys: &[&str]) -> &str {
        keys.iter()
            .filter_map(|key| self.get(key))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for DirectoryRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = DirectoryRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Full source snapshot keyed by external id
pub type DirectorySnapshot = HashMap<String, DirectoryRecord>;

/// Handle to an existing user in the target system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    pub id: i64,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

/// A user to be created in the target system
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub external_id: String,
    pub department: Option<String>,
    pub suspended: bool,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("external_id", &self.external_id)
            .field("department", &self.department)
            .field("suspended", &self.suspended)
            .finish()
    }
}

/// Changes pushed onto an existing target user. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUpdate {
    pub id: i64,
    pub external_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub suspended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("" => ChangeAction::Updated ; "missing defaults to updated")]
    #[test_case("Updated" => ChangeAction::Updated)]
    #[test_case("Inserted" => ChangeAction::Updated)]
    #[test_case("DELETED" => ChangeAction::Deleted)]
    #[test_case(" deleted " => ChangeAction::Deleted ; "padded deleted")]
    #[test_case("Archived" => ChangeAction::Unknown)]
    fn test_change_action_parse(raw: &str) -> ChangeAction {
        ChangeAction::parse(raw)
    }

    #[test]
    fn test_directory_record_lowercases_keys() {
        let record: DirectoryRecord = [("WorkEmail", "a@b.co"), (" Department ", "Ops")]
            .into_iter()
            .collect();

        assert_eq!(record.get("workemail"), Some("a@b.co"));
        assert_eq!(record.get("department"), Some("Ops"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_first_non_empty_skips_blank_values() {
        let record: DirectoryRecord = [("preferredname", "   "), ("firstname", " Ada ")]
            .into_iter()
            .collect();

        assert_eq!(record.first_non_empty(&["preferredname", "firstname"]), "Ada");
        assert_eq!(record.first_non_empty(&["nickname"]), "");
    }

    #[test]
    fn test_new_user_debug_redacts_password() {
        let user = NewUser {
            username: "bamboo_1".to_string(),
            password: "s3cret-Password!".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            external_id: "1".to_string(),
            department: None,
            suspended: false,
        };

        let rendered = format!("{user:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
