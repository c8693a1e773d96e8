//! In-process user store.
//!
//! Keeps records in insertion order. Email uniqueness is optional so both
//! outcomes of the lookup-then-insert race can be reproduced.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::contract::model::{NewUserRecord, UserRecord};
use crate::domain::repo::UserStore;

#[derive(Default)]
struct Inner {
    rows: Vec<UserRecord>,
    fail_next_find: Option<String>,
    fail_next_insert: Option<String>,
}

#[derive(Default)]
pub struct InMemoryUserStore {
    inner: Mutex<Inner>,
    unique_email: bool,
    find_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl InMemoryUserStore {
    /// Store without a uniqueness constraint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects a second record for the same email.
    pub fn with_unique_email() -> Self {
        Self {
            unique_email: true,
            ..Self::default()
        }
    }

    /// Seed a record directly, bypassing counters and constraints.
    pub fn seed(&self, record: UserRecord) {
        self.inner.lock().rows.push(record);
    }

    pub fn records(&self) -> Vec<UserRecord> {
        self.inner.lock().rows.clone()
    }

    pub fn count_for(&self, email: &str) -> usize {
        self.inner
            .lock()
            .rows
            .iter()
            .filter(|r| r.email == email)
            .count()
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_find(&self, message: impl Into<String>) {
        self.inner.lock().fail_next_find = Some(message.into());
    }

    pub fn fail_next_insert(&self, message: impl Into<String>) {
        self.inner.lock().fail_next_insert = Some(message.into());
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Vec<UserRecord>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next_find.take() {
            bail!(message);
        }
        Ok(inner
            .rows
            .iter()
            .filter(|r| r.email == email)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: NewUserRecord) -> anyhow::Result<UserRecord> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next_insert.take() {
            bail!(message);
        }
        if self.unique_email && inner.rows.iter().any(|r| r.email == record.email) {
            bail!("UNIQUE constraint failed: users.email");
        }
        let stored = UserRecord {
            id: Uuid::new_v4(),
            email: record.email,
            name: record.name,
            picture: record.picture,
            created_at: Utc::now(),
        };
        inner.rows.push(stored.clone());
        Ok(stored)
    }
}
