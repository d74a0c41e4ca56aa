//! Per-record reconciliation policy
//!
//! Decides, for one resolved identity, whether the target user is updated,
//! suspended, created, or left alone, and issues the matching target call.
//! Rules are evaluated in order and the first match wins:
//!
//! 1. a target user exists (by external id, else by valid email): update it,
//!    suspending it when the identity is inactive
//! 2. inactive and unknown to the target: skip
//! 3. no email: skip
//! 4. malformed email: skip
//! 5. otherwise: create

use roster_core::{NewUser, TargetDirectory, TargetUser, UserUpdate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::identity::Identity;
use crate::password::{generate_password, DEFAULT_PASSWORD_LENGTH};

/// What happened to one change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Created,
    Updated,
    Suspended,
    SkippedDeleted,
    SkippedNoEmail,
    SkippedInvalidEmail,
}

impl RecordOutcome {
    /// Whether the outcome counts towards `processed`
    pub fn is_processed(&self) -> bool {
        matches!(
            self,
            RecordOutcome::Created | RecordOutcome::Updated | RecordOutcome::Suspended
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Created => "created",
            RecordOutcome::Updated => "updated",
            RecordOutcome::Suspended => "suspended",
            RecordOutcome::SkippedDeleted => "skipped_deleted",
            RecordOutcome::SkippedNoEmail => "skipped_no_email",
            RecordOutcome::SkippedInvalidEmail => "skipped_invalid_email",
        }
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Reconciler {
    target: Arc<dyn TargetDirectory>,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(target: Arc<dyn TargetDirectory>, dry_run: bool) -> Self {
        Self { target, dry_run }
    }

    /// Reconcile one identity against the target.
    pub async fn reconcile(&self, identity: &Identity) -> Result<RecordOutcome> {
        if let Some(existing) = self.find_existing(identity).await? {
            let update = update_for(existing.id, identity);
            if self.dry_run {
                debug!(external_id = %identity.external_id, target_id = existing.id, "DRY RUN: would update user");
            } else {
                self.target.update_user(&update).await?;
            }

            return Ok(if identity.is_inactive {
                RecordOutcome::Suspended
            } else {
                RecordOutcome::Updated
            });
        }

        if identity.is_inactive {
            return Ok(RecordOutcome::SkippedDeleted);
        }
        if identity.email.is_empty() {
            return Ok(RecordOutcome::SkippedNoEmail);
        }
        if !identity.has_valid_email() {
            return Ok(RecordOutcome::SkippedInvalidEmail);
        }

        let new_user = NewUser {
            username: identity.username.clone(),
            password: generate_password(DEFAULT_PASSWORD_LENGTH),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            email: identity.email.clone(),
            external_id: identity.external_id.clone(),
            department: identity.department.clone(),
            suspended: identity.is_inactive,
        };

        if self.dry_run {
            debug!(external_id = %identity.external_id, username = %new_user.username, "DRY RUN: would create user");
        } else {
            let created = self.target.create_user(&new_user).await?;
            info!(external_id = %identity.external_id, target_id = created.id, "Created target user");
        }

        Ok(RecordOutcome::Created)
    }

    /// Look up by external id, falling back to email only when it is valid.
    async fn find_existing(&self, identity: &Identity) -> Result<Option<TargetUser>> {
        if let Some(user) = self.target.find_by_external_id(&identity.external_id).await? {
            return Ok(Some(user));
        }

        if identity.has_valid_email() {
            return Ok(self.target.find_by_email(&identity.email).await?);
        }

        Ok(None)
    }
}

fn update_for(id: i64, identity: &Identity) -> UserUpdate {
    let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());

    UserUpdate {
        id,
        external_id: identity.external_id.clone(),
        first_name: non_empty(&identity.first_name),
        last_name: non_empty(&identity.last_name),
        email: identity
            .has_valid_email()
            .then(|| identity.email.clone()),
        department: identity.department.clone(),
        suspended: identity.is_inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolve_identity;
    use crate::test_support::FakeTarget;
    use roster_core::{ChangeAction, DirectoryRecord};

    fn identity(id: &str, action: ChangeAction, pairs: &[(&str, &str)]) -> Identity {
        let record: DirectoryRecord = pairs.iter().copied().collect();
        resolve_identity(id, action, &record)
    }

    fn ada(id: &str) -> Identity {
        identity(
            id,
            ChangeAction::Updated,
            &[("firstName", "Ada"), ("lastName", "Lovelace"), ("workEmail", "ada@example.com")],
        )
    }

    #[tokio::test]
    async fn test_new_valid_identity_is_created() {
        let target = Arc::new(FakeTarget::new());
        let reconciler = Reconciler::new(target.clone(), false);

        let outcome = reconciler.reconcile(&ada("1")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Created);
        let created = target.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].username, "bamboo_1");
        assert_eq!(created[0].external_id, "1");
        assert!(!created[0].suspended);
        assert!(created[0].password.len() >= DEFAULT_PASSWORD_LENGTH);
    }

    #[tokio::test]
    async fn test_existing_user_is_updated() {
        let target = Arc::new(FakeTarget::new());
        let id = target.insert_user(Some("1"), Some("old@example.com"));
        let reconciler = Reconciler::new(target.clone(), false);

        let outcome = reconciler.reconcile(&ada("1")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Updated);
        let updates = target.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, id);
        assert_eq!(updates[0].email.as_deref(), Some("ada@example.com"));
        assert_eq!(updates[0].department, None);
        assert!(!updates[0].suspended);
        assert!(target.created().is_empty());
    }

    #[tokio::test]
    async fn test_email_fallback_links_unlinked_user() {
        let target = Arc::new(FakeTarget::new());
        let id = target.insert_user(None, Some("ada@example.com"));
        let reconciler = Reconciler::new(target.clone(), false);

        let outcome = reconciler.reconcile(&ada("1")).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Updated);
        assert_eq!(target.updates()[0].id, id);
        assert_eq!(target.updates()[0].external_id, "1");
    }

    #[tokio::test]
    async fn test_invalid_email_is_never_used_for_lookup() {
        let target = Arc::new(FakeTarget::new());
        target.insert_user(None, Some("not-an-email"));
        let reconciler = Reconciler::new(target.clone(), false);
        let broken = identity("1", ChangeAction::Updated, &[("workEmail", "not-an-email")]);

        let outcome = reconciler.reconcile(&broken).await.unwrap();

        assert_eq!(outcome, RecordOutcome::SkippedInvalidEmail);
        assert_eq!(target.email_lookups(), 0);
    }

    #[tokio::test]
    async fn test_inactive_existing_user_is_suspended() {
        let target = Arc::new(FakeTarget::new());
        target.insert_user(Some("1"), None);
        let reconciler = Reconciler::new(target.clone(), false);
        let leaver = identity("1", ChangeAction::Updated, &[("status", "Terminated")]);

        let outcome = reconciler.reconcile(&leaver).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Suspended);
        let update = &target.updates()[0];
        assert!(update.suspended);
        assert_eq!(update.email, None);
        assert_eq!(update.first_name.as_deref(), Some("Unknown"));
    }

    #[tokio::test]
    async fn test_skips_are_not_errors() {
        let target = Arc::new(FakeTarget::new());
        let reconciler = Reconciler::new(target.clone(), false);

        let deleted = identity("1", ChangeAction::Deleted, &[("workEmail", "a@b.co")]);
        let no_email = identity("2", ChangeAction::Updated, &[("firstName", "A")]);

        assert_eq!(reconciler.reconcile(&deleted).await.unwrap(), RecordOutcome::SkippedDeleted);
        assert_eq!(reconciler.reconcile(&no_email).await.unwrap(), RecordOutcome::SkippedNoEmail);
        assert!(target.created().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_twice_never_duplicates() {
        let target = Arc::new(FakeTarget::new());
        let reconciler = Reconciler::new(target.clone(), false);
        let identity = ada("1");

        let first = reconciler.reconcile(&identity).await.unwrap();
        let second = reconciler.reconcile(&identity).await.unwrap();

        assert_eq!(first, RecordOutcome::Created);
        assert_eq!(second, RecordOutcome::Updated);
        assert_eq!(target.created().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_writes() {
        let target = Arc::new(FakeTarget::new());
        target.insert_user(Some("2"), None);
        let reconciler = Reconciler::new(target.clone(), true);

        assert_eq!(reconciler.reconcile(&ada("1")).await.unwrap(), RecordOutcome::Created);
        assert_eq!(reconciler.reconcile(&ada("2")).await.unwrap(), RecordOutcome::Updated);
        assert!(target.created().is_empty());
        assert!(target.updates().is_empty());
    }

    #[test]
    fn test_processed_outcomes() {
        assert!(RecordOutcome::Created.is_processed());
        assert!(RecordOutcome::Suspended.is_processed());
        assert!(!RecordOutcome::SkippedNoEmail.is_processed());
        assert_eq!(RecordOutcome::SkippedInvalidEmail.to_string(), "skipped_invalid_email");
    }
}
