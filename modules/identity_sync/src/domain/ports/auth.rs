use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::claims::ProviderIdentity;

/// Authentication state transition reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// Provider session; only the user object matters here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<ProviderIdentity>,
}

impl Session {
    pub fn for_user(user: ProviderIdentity) -> Self {
        Self { user: Some(user) }
    }
}

/// One `(event, session)` pair from the auth event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthChange {
    pub event: AuthEventKind,
    #[serde(default)]
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn signed_in(user: ProviderIdentity) -> Self {
        Self {
            event: AuthEventKind::SignedIn,
            session: Some(Session::for_user(user)),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            event: AuthEventKind::SignedOut,
            session: None,
        }
    }

    /// The identity carried by this change; `None` means logged out.
    pub fn identity(&self) -> Option<&ProviderIdentity> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }
}

pub type SubscriptionId = u64;

/// Live subscription to the auth change stream.
/// The stream ends once the source unsubscribes it or shuts down.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub changes: mpsc::UnboundedReceiver<AuthChange>,
}

/// Port for the hosted authentication provider.
#[async_trait]
pub trait AuthEventSource: Send + Sync {
    fn subscribe(&self) -> Subscription;

    fn unsubscribe(&self, id: SubscriptionId);

    /// One-shot read of the session active right now.
    async fn current_session(&self) -> anyhow::Result<Option<Session>>;
}
