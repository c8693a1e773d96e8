//! In-process auth event source backed by tokio channels.
//!
//! Stands in for the hosted provider: whatever feeds authentication changes
//! (a webhook receiver, a JSON-lines file, a test) calls `emit`, and every
//! live subscription receives the change. The last emitted session is what
//! `current_session` reports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::ports::{AuthChange, AuthEventSource, Session, Subscription, SubscriptionId};

#[derive(Default)]
pub struct ChannelAuthSource {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<AuthChange>>>,
    session: Mutex<Option<Session>>,
    session_error: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl ChannelAuthSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let source = Self::default();
        *source.session.lock() = Some(session);
        source
    }

    /// Broadcast a change and remember its session. Returns how many
    /// subscribers received it.
    pub fn emit(&self, change: AuthChange) -> usize {
        *self.session.lock() = change.session.clone();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, tx| tx.send(change.clone()).is_ok());
        subscribers.len()
    }

    /// End every subscription stream.
    pub fn close(&self) {
        let dropped = std::mem::take(&mut *self.subscribers.lock());
        debug!(subscriptions = dropped.len(), "Auth source closed");
    }

    /// Make the next `current_session` read fail.
    pub fn fail_next_session_read(&self, message: impl Into<String>) {
        *self.session_error.lock() = Some(message.into());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[async_trait]
impl AuthEventSource for ChannelAuthSource {
    fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, tx);
        debug!(subscription = id, "Subscribed to auth changes");
        Subscription { id, changes: rx }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(subscription = id, "Unsubscribed from auth changes");
        }
    }

    async fn current_session(&self) -> anyhow::Result<Option<Session>> {
        if let Some(message) = self.session_error.lock().take() {
            anyhow::bail!(message);
        }
        Ok(self.session.lock().clone())
    }
}
