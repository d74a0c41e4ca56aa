//! In-memory stand-ins for every adapter the engine talks to

use async_trait::async_trait;
use roster_core::api::Result as ApiResult;
use roster_core::{
    ApiError, ChangeAction, ChangeFeed, ChangePage, ChangeRecord, DirectoryRecord,
    DirectorySnapshot, DirectorySource, NewUser, TargetDirectory, TargetUser, UserUpdate,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cursor::Cursor;
use crate::error::{Result, SyncError};
use crate::state::{MemoryStateStore, StateStore};

pub struct FakeFeed {
    page: Mutex<ChangePage>,
    requested: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeFeed {
    pub fn new(latest: &str, ids: &[&str]) -> Self {
        let records = ids
            .iter()
            .map(|id| ChangeRecord::new(*id, ChangeAction::Updated, "2024-01-15T00:00:00Z"))
            .collect();
        Self::with_page(ChangePage::new(records, latest))
    }

    pub fn with_page(page: ChangePage) -> Self {
        Self {
            page: Mutex::new(page),
            requested: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let feed = Self::new("2024-02-01T00:00:00Z", &[]);
        feed.fail.store(true, Ordering::SeqCst);
        feed
    }

    pub fn set_page(&self, page: ChangePage) {
        *self.page.lock().unwrap() = page;
    }

    /// `since` values seen so far, in call order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn fetch_changes(&self, since: &str) -> ApiResult<ChangePage> {
        self.requested.lock().unwrap().push(since.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Server {
                status: 503,
                message: "feed unavailable".to_string(),
            });
        }
        Ok(self.page.lock().unwrap().clone())
    }
}

pub struct FakeDirectory {
    snapshot: DirectorySnapshot,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self {
            snapshot: DirectorySnapshot::new(),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with(mut self, id: &str, pairs: &[(&str, &str)]) -> Self {
        let record: DirectoryRecord = pairs.iter().copied().collect();
        self.snapshot.insert(id.to_string(), record);
        self
    }

    /// A valid, active employee with a work email derived from `id`
    pub fn with_employee(self, id: &str) -> Self {
        let last_name = format!("Employee{id}");
        let email = format!("employee{id}@example.com");
        self.with(
            id,
            &[
                ("firstName", "Test"),
                ("lastName", last_name.as_str()),
                ("workEmail", email.as_str()),
            ],
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectorySource for FakeDirectory {
    async fn fetch_directory(&self) -> ApiResult<DirectorySnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ApiError::Xml("truncated directory".to_string()));
        }
        Ok(self.snapshot.clone())
    }
}

pub struct FakeTarget {
    users: Mutex<Vec<TargetUser>>,
    created: Mutex<Vec<NewUser>>,
    updates: Mutex<Vec<UserUpdate>>,
    failing_updates: Mutex<HashSet<String>>,
    email_lookups: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            failing_updates: Mutex::new(HashSet::new()),
            email_lookups: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Seed an existing user and return its target id.
    pub fn insert_user(&self, external_id: Option<&str>, email: Option<&str>) -> i64 {
        let mut users = self.users.lock().unwrap();
        let id = 1000 + users.len() as i64;
        users.push(TargetUser {
            id,
            external_id: external_id.map(str::to_string),
            email: email.map(str::to_string),
            username: None,
        });
        id
    }

    /// Make every update carrying `external_id` come back with warnings.
    pub fn fail_updates_for(&self, external_id: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(external_id.to_string());
    }

    pub fn created(&self) -> Vec<NewUser> {
        self.created.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<UserUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn email_lookups(&self) -> usize {
        self.email_lookups.load(Ordering::SeqCst)
    }

    /// Every call of any kind
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetDirectory for FakeTarget {
    async fn find_by_external_id(&self, external_id: &str) -> ApiResult<Option<TargetUser>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> ApiResult<Option<TargetUser>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> ApiResult<TargetUser> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.insert_user(Some(&user.external_id), Some(&user.email));
        self.created.lock().unwrap().push(user.clone());
        Ok(TargetUser {
            id,
            external_id: Some(user.external_id.clone()),
            email: Some(user.email.clone()),
            username: Some(user.username.clone()),
        })
    }

    async fn update_user(&self, update: &UserUpdate) -> ApiResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_updates.lock().unwrap().contains(&update.external_id) {
            return Err(ApiError::Warnings {
                function: "core_user_update_users".to_string(),
                warnings: r#"[{"warningcode":"invaliduserid"}]"#.to_string(),
            });
        }

        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == update.id) {
            user.external_id = Some(update.external_id.clone());
            if let Some(email) = &update.email {
                user.email = Some(email.clone());
            }
        }
        drop(users);

        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// A store whose writes always fail
pub struct ReadOnlyStateStore {
    inner: MemoryStateStore,
}

impl ReadOnlyStateStore {
    pub fn new(cursor: Cursor) -> Self {
        Self {
            inner: MemoryStateStore::with_cursor(cursor),
        }
    }
}

#[async_trait]
impl StateStore for ReadOnlyStateStore {
    fn describe(&self) -> String {
        "read-only".to_string()
    }

    async fn read(&self) -> Result<Cursor> {
        self.inner.read().await
    }

    async fn write(&self, _cursor: &Cursor) -> Result<Cursor> {
        Err(SyncError::store(self.describe(), "write rejected"))
    }
}
