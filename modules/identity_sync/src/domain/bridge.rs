//! Bridge between the auth event source and the synchronizer for the
//! lifetime of a host.
//!
//! Activation subscribes to the change stream and, independently, reads the
//! current session once. Every identity-carrying change starts a detached
//! synchronization task; the pump never waits for it. Deactivation stops the
//! pump and unsubscribes, but lets in-flight synchronizations run to the end
//! with their results discarded.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::contract::model::UserRecord;
use crate::domain::claims::ProviderIdentity;
use crate::domain::error::DomainError;
use crate::domain::ports::{AuthChange, AuthEventSource, SubscriptionId};
use crate::domain::service::Service;

/// Completion handle for one detached synchronization.
#[derive(Debug)]
pub struct SyncHandle(JoinHandle<Result<UserRecord, DomainError>>);

impl SyncHandle {
    /// `None` if the task panicked or was aborted.
    pub async fn wait(self) -> Option<Result<UserRecord, DomainError>> {
        self.0.await.ok()
    }
}

pub struct IdentityBridge {
    service: Arc<Service>,
    source: Arc<dyn AuthEventSource>,
}

impl IdentityBridge {
    pub fn new(service: Arc<Service>, source: Arc<dyn AuthEventSource>) -> Self {
        Self { service, source }
    }

    pub fn activate(&self) -> ActiveBridge {
        let subscription = self.source.subscribe();
        let cancel = CancellationToken::new();
        // Each activation writes through its own scope; deactivation
        // detaches only that scope.
        let scoped = self.service.with_current(self.service.current().attach());
        let dispatcher = Dispatcher {
            service: Arc::new(scoped),
            tracker: TaskTracker::new(),
        };

        // Reconciliation read. Races the change stream; both may start a
        // synchronization for the same session.
        {
            let source = self.source.clone();
            let tracker = dispatcher.tracker.clone();
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tracker.spawn(
                async move {
                    match source.current_session().await {
                        Ok(Some(session)) => match session.user {
                            Some(user) if !cancel.is_cancelled() => {
                                info!("User found on activation");
                                dispatcher.spawn_sync(user);
                            }
                            Some(_) => debug!("Deactivated before reconciliation finished"),
                            None => debug!("Session without user on activation"),
                        },
                        Ok(None) => debug!("No session on activation"),
                        Err(e) => warn!(error = %e, "Reading current session failed"),
                    }
                }
                .instrument(info_span!("identity_sync.bridge.reconcile")),
            );
        }

        let pump = tokio::spawn(pump_changes(
            subscription.changes,
            dispatcher.clone(),
            cancel.clone(),
        ));

        info!(subscription = subscription.id, "Identity bridge activated");
        ActiveBridge {
            dispatcher,
            source: self.source.clone(),
            subscription_id: subscription.id,
            cancel,
            pump: Mutex::new(Some(pump)),
        }
    }
}

/// A bridge between `activate` and `deactivate`.
pub struct ActiveBridge {
    dispatcher: Dispatcher,
    source: Arc<dyn AuthEventSource>,
    subscription_id: SubscriptionId,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveBridge {
    /// Handle one change as if it came from the stream.
    pub fn dispatch(&self, change: AuthChange) -> Option<SyncHandle> {
        self.dispatcher.dispatch(change)
    }

    /// Wait until every synchronization started so far has finished.
    pub async fn settle(&self) {
        let tracker = &self.dispatcher.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Wait for the change stream to end, then settle.
    pub async fn drain(&self) {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(error = %e, "Auth change pump terminated abnormally");
            }
        }
        self.settle().await;
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Stop accepting changes. In-flight synchronizations keep running but
    /// can no longer change the current user.
    pub async fn deactivate(self) {
        self.cancel.cancel();
        self.source.unsubscribe(self.subscription_id);
        self.dispatcher.service.current().detach();

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                warn!(error = %e, "Auth change pump terminated abnormally");
            }
        }
        info!(
            subscription = self.subscription_id,
            in_flight = self.dispatcher.tracker.len(),
            "Identity bridge deactivated"
        );
    }
}

#[derive(Clone)]
struct Dispatcher {
    service: Arc<Service>,
    tracker: TaskTracker,
}

impl Dispatcher {
    fn dispatch(&self, change: AuthChange) -> Option<SyncHandle> {
        match change.identity() {
            Some(user) => {
                info!(event = ?change.event, "Auth state changed, user logged in");
                Some(self.spawn_sync(user.clone()))
            }
            None => {
                info!(event = ?change.event, "Auth state changed, no user");
                self.service.sign_out();
                None
            }
        }
    }

    fn spawn_sync(&self, user: ProviderIdentity) -> SyncHandle {
        let service = self.service.clone();
        let handle = self.tracker.spawn(
            async move {
                let outcome = service.sync_identity(&user).await;
                if let Err(e) = &outcome {
                    warn!(error = %e, "Identity synchronization failed");
                }
                outcome
            }
            .instrument(info_span!("identity_sync.bridge.sync")),
        );
        SyncHandle(handle)
    }
}

async fn pump_changes(
    mut changes: mpsc::UnboundedReceiver<AuthChange>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Auth change pump cancelled");
                break;
            }
            next = changes.recv() => match next {
                Some(change) => {
                    // Fire-and-forget.
                    let _ = dispatcher.dispatch(change);
                }
                None => {
                    debug!("Auth change stream ended");
                    break;
                }
            }
        }
    }
}
