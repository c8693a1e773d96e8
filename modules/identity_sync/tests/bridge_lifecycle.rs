//! Activation, event handling and deactivation of the identity bridge.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing_test::traced_test;

use identity_sync::config::IdentitySyncConfig;
use identity_sync::contract::model::{NewUserRecord, UserRecord};
use identity_sync::domain::claims::ProviderIdentity;
use identity_sync::domain::error::DomainError;
use identity_sync::domain::events::IdentityDomainEvent;
use identity_sync::domain::ports::EventPublisher;
use identity_sync::domain::ports::{AuthChange, AuthEventKind, Session};
use identity_sync::domain::repo::UserStore;
use identity_sync::infra::auth::ChannelAuthSource;
use identity_sync::infra::storage::InMemoryUserStore;
use identity_sync::IdentitySync;

use common::{google_user, RecordingPublisher};

fn module(store: Arc<dyn UserStore>, source: Arc<ChannelAuthSource>) -> IdentitySync {
    IdentitySync::new(
        &IdentitySyncConfig::default(),
        store,
        source,
        Arc::new(RecordingPublisher::default()),
    )
}

#[tokio::test]
async fn activation_reconciles_existing_session() {
    let store = Arc::new(InMemoryUserStore::with_unique_email());
    let source = Arc::new(ChannelAuthSource::with_session(Session::for_user(
        google_user("mounted@example.com", "Mounted"),
    )));
    let sync = module(store.clone(), source.clone());

    let active = sync.activate();
    active.settle().await;

    let current = sync.current_user().get().expect("user resolved on activation");
    assert_eq!(current.email, "mounted@example.com");
    assert_eq!(store.count_for("mounted@example.com"), 1);
    assert_eq!(source.subscriber_count(), 1);
    active.deactivate().await;
}

#[tokio::test]
async fn activation_without_session_does_nothing() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source);

    let active = sync.activate();
    active.settle().await;

    assert_eq!(sync.current_user().get(), None);
    assert_eq!(store.find_calls(), 0);
    active.deactivate().await;
}

#[tokio::test]
async fn failing_session_read_is_ignored() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    source.fail_next_session_read("provider offline");
    let sync = module(store.clone(), source.clone());

    let active = sync.activate();
    active.settle().await;
    assert_eq!(store.find_calls(), 0);

    // The stream still works afterwards.
    let handle = active
        .dispatch(AuthChange::signed_in(google_user("later@example.com", "Later")))
        .unwrap();
    assert!(handle.wait().await.unwrap().is_ok());
    active.deactivate().await;
}

#[tokio::test]
async fn streamed_changes_sync_and_logout_clears() {
    let store = Arc::new(InMemoryUserStore::with_unique_email());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source.clone());
    let active = sync.activate();
    let mut watcher = sync.current_user().subscribe();

    source.emit(AuthChange::signed_in(google_user("s@example.com", "Streamer")));
    watcher.changed().await.unwrap();
    assert_eq!(
        watcher.borrow().as_ref().map(|u| u.email.clone()),
        Some("s@example.com".to_string())
    );

    let finds = store.find_calls();
    source.emit(AuthChange::signed_out());
    watcher.changed().await.unwrap();
    assert_eq!(*watcher.borrow(), None);
    assert_eq!(store.find_calls(), finds);

    active.deactivate().await;
}

#[tokio::test]
async fn non_identity_session_counts_as_logout() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source);
    let active = sync.activate();

    let handle = active
        .dispatch(AuthChange::signed_in(google_user("a@example.com", "A")))
        .unwrap();
    handle.wait().await.unwrap().unwrap();

    let change = AuthChange {
        event: AuthEventKind::TokenRefreshed,
        session: Some(Session::default()),
    };
    assert!(active.dispatch(change).is_none());
    assert_eq!(sync.current_user().get(), None);
    active.deactivate().await;
}

#[tokio::test]
async fn one_failed_event_does_not_block_the_next() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source);
    let active = sync.activate();

    let missing = active
        .dispatch(AuthChange::signed_in(ProviderIdentity::default()))
        .unwrap();
    assert_eq!(
        missing.wait().await.unwrap().unwrap_err(),
        DomainError::MissingIdentityKey
    );

    store.fail_next_find("flaky");
    let flaky = active
        .dispatch(AuthChange::signed_in(google_user("f@example.com", "F")))
        .unwrap();
    assert!(flaky.wait().await.unwrap().is_err());

    let ok = active
        .dispatch(AuthChange::signed_in(google_user("f@example.com", "F")))
        .unwrap();
    let record = ok.wait().await.unwrap().unwrap();
    assert_eq!(sync.current_user().get(), Some(record));
    active.deactivate().await;
}

#[tokio::test]
async fn mount_read_and_first_event_both_sync_the_same_session() {
    let store = Arc::new(InMemoryUserStore::with_unique_email());
    let user = google_user("boot@example.com", "Boot");
    let source = Arc::new(ChannelAuthSource::with_session(Session::for_user(
        user.clone(),
    )));
    let sync = module(store.clone(), source.clone());

    let active = sync.activate();
    source.emit(AuthChange {
        event: AuthEventKind::InitialSession,
        session: Some(Session::for_user(user)),
    });
    source.close();
    active.drain().await;

    // Two entry paths, two lookups; the unique store keeps a single row.
    assert_eq!(store.find_calls(), 2);
    assert_eq!(store.count_for("boot@example.com"), 1);
    assert_eq!(
        sync.current_user().get().map(|u| u.email),
        Some("boot@example.com".to_string())
    );
    active.deactivate().await;
}

/// Store whose inserts wait for an explicit release.
struct GatedStore {
    inner: InMemoryUserStore,
    gate: Notify,
}

#[async_trait]
impl UserStore for GatedStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Vec<UserRecord>> {
        self.inner.find_by_email(email).await
    }

    async fn insert(&self, record: NewUserRecord) -> anyhow::Result<UserRecord> {
        self.gate.notified().await;
        self.inner.insert(record).await
    }
}

#[tokio::test]
async fn deactivation_lets_in_flight_sync_finish_but_discards_result() {
    let store = Arc::new(GatedStore {
        inner: InMemoryUserStore::new(),
        gate: Notify::new(),
    });
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source.clone());
    let active = sync.activate();

    let handle = active
        .dispatch(AuthChange::signed_in(google_user("late@example.com", "Late")))
        .unwrap();

    // Let the sync reach the gated insert.
    while store.inner.find_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    active.deactivate().await;
    assert_eq!(source.subscriber_count(), 0);

    store.gate.notify_one();
    let outcome = handle.wait().await.unwrap();

    // The write happened, the host just never sees it.
    assert!(outcome.is_ok());
    assert_eq!(store.inner.count_for("late@example.com"), 1);
    assert_eq!(sync.current_user().get(), None);
}

#[tokio::test]
async fn reactivation_after_deactivation_tracks_the_user_again() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source.clone());

    sync.activate().deactivate().await;
    let active = sync.activate();
    assert_eq!(source.subscriber_count(), 1);

    let handle = active
        .dispatch(AuthChange::signed_in(google_user("r@example.com", "Remount")))
        .unwrap();
    let record = handle.wait().await.unwrap().unwrap();
    assert_eq!(sync.current_user().get(), Some(record));

    assert!(active.dispatch(AuthChange::signed_out()).is_none());
    assert_eq!(sync.current_user().get(), None);
    active.deactivate().await;
}

#[tokio::test]
async fn late_result_of_old_activation_does_not_leak_into_new_one() {
    let store = Arc::new(GatedStore {
        inner: InMemoryUserStore::new(),
        gate: Notify::new(),
    });
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source.clone());

    let first = sync.activate();
    let stale = first
        .dispatch(AuthChange::signed_in(google_user("stale@example.com", "Stale")))
        .unwrap();
    while store.inner.find_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    first.deactivate().await;

    let second = sync.activate();
    store.gate.notify_one();
    assert!(stale.wait().await.unwrap().is_ok());
    assert_eq!(sync.current_user().get(), None);
    second.deactivate().await;
}

/// Publisher that blows up on logout, taking the pump task down with it.
struct PanickingPublisher {
    reached: Notify,
}

impl EventPublisher<IdentityDomainEvent> for PanickingPublisher {
    fn publish(&self, event: &IdentityDomainEvent) {
        if let IdentityDomainEvent::CurrentUserCleared { .. } = event {
            self.reached.notify_one();
            panic!("publisher exploded");
        }
    }
}

#[traced_test]
#[tokio::test]
async fn deactivation_reports_a_crashed_pump() {
    let publisher = Arc::new(PanickingPublisher {
        reached: Notify::new(),
    });
    let source = Arc::new(ChannelAuthSource::new());
    let sync = IdentitySync::new(
        &IdentitySyncConfig::default(),
        Arc::new(InMemoryUserStore::new()),
        source.clone(),
        publisher.clone(),
    );
    let active = sync.activate();

    source.emit(AuthChange::signed_out());
    publisher.reached.notified().await;
    active.deactivate().await;

    assert!(logs_contain("Auth change pump terminated abnormally"));
    assert!(logs_contain("Identity bridge deactivated"));
}

#[tokio::test]
async fn changes_after_deactivation_are_not_delivered() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source.clone());

    let active = sync.activate();
    active.deactivate().await;

    assert_eq!(
        source.emit(AuthChange::signed_in(google_user("x@example.com", "X"))),
        0
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.find_calls(), 0);
}

#[tokio::test]
async fn local_client_delegates_to_service() {
    let store = Arc::new(InMemoryUserStore::new());
    let source = Arc::new(ChannelAuthSource::new());
    let sync = module(store.clone(), source);
    let client = sync.client();

    let record = client
        .sync_identity(&google_user("c@example.com", "Client"))
        .await
        .unwrap();
    assert_eq!(client.current_user(), Some(record));

    client.sign_out();
    assert_eq!(client.current_user(), None);

    let err = client
        .sync_identity(&ProviderIdentity::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        identity_sync::contract::error::IdentitySyncError::MissingIdentityKey
    );
}

#[test]
fn auth_change_parses_provider_json() {
    let raw = r#"{
        "event": "SIGNED_IN",
        "session": {
            "access_token": "ignored",
            "user": {
                "id": "u-1",
                "email": "json@example.com",
                "user_metadata": { "full_name": "Jay Son" }
            }
        }
    }"#;
    let change: AuthChange = serde_json::from_str(raw).unwrap();
    assert_eq!(change.event, AuthEventKind::SignedIn);
    let identity = change.identity().unwrap();
    assert_eq!(identity.email.as_deref(), Some("json@example.com"));

    let logout: AuthChange =
        serde_json::from_str(r#"{"event":"SIGNED_OUT","session":null}"#).unwrap();
    assert!(logout.identity().is_none());

    assert!(serde_json::from_str::<AuthChange>(r#"{"event":"SOMETHING_ELSE"}"#).is_err());
}
