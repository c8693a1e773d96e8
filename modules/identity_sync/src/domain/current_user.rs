use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::contract::model::UserRecord;

/// Session-scoped "current user" value, owned by whoever hosts the
/// synchronizer and handed to it explicitly.
///
/// Cheap to clone; all clones share the same value. Each handle carries its
/// own writer scope: once a scope is detached (host gone), writes through it
/// are dropped so late synchronization results cannot resurrect a user.
/// `attach` opens a fresh scope over the same value.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    tx: Arc<watch::Sender<Option<UserRecord>>>,
    detached: Arc<AtomicBool>,
}

impl Default for CurrentUser {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentUser {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self) -> Option<UserRecord> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserRecord>> {
        self.tx.subscribe()
    }

    /// Returns false if the value was discarded because the host is gone.
    pub fn set(&self, user: UserRecord) -> bool {
        if self.is_detached() {
            return false;
        }
        self.tx.send_replace(Some(user));
        true
    }

    pub fn clear(&self) -> bool {
        if self.is_detached() {
            return false;
        }
        self.tx.send_replace(None);
        true
    }

    /// Handle over the same value with its own, attached writer scope.
    pub fn attach(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}
