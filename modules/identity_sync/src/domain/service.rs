use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use crate::config::IdentitySyncConfig;
use crate::contract::model::{IdentityClaims, NewUserRecord, UserRecord};
use crate::domain::claims::{normalize, ProviderIdentity};
use crate::domain::current_user::CurrentUser;
use crate::domain::error::DomainError;
use crate::domain::events::IdentityDomainEvent;
use crate::domain::ports::EventPublisher;
use crate::domain::repo::UserStore;

/// Lookup-or-create synchronizer: makes sure exactly one user record exists
/// per email and publishes the resolved record as the current user.
///
/// The lookup and the insert are two separate store calls, not a
/// transaction. Two concurrent calls for the same new email can both miss
/// and both insert unless the store enforces email uniqueness.
#[derive(Clone)]
pub struct Service {
    store: Arc<dyn UserStore>,
    events: Arc<dyn EventPublisher<IdentityDomainEvent>>,
    current: CurrentUser,
    config: ServiceConfig,
}

/// Configuration for the domain service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub lookup_timeout: Duration,
    pub insert_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from(&IdentitySyncConfig::default())
    }
}

impl From<&IdentitySyncConfig> for ServiceConfig {
    fn from(cfg: &IdentitySyncConfig) -> Self {
        Self {
            lookup_timeout: cfg.lookup_timeout,
            insert_timeout: cfg.insert_timeout,
        }
    }
}

impl Service {
    pub fn new(
        store: Arc<dyn UserStore>,
        events: Arc<dyn EventPublisher<IdentityDomainEvent>>,
        current: CurrentUser,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            events,
            current,
            config,
        }
    }

    /// Same store, publisher and config, writing through `current`.
    pub fn with_current(&self, current: CurrentUser) -> Self {
        Self {
            current,
            ..self.clone()
        }
    }

    pub fn current(&self) -> &CurrentUser {
        &self.current
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.current.get()
    }

    /// Normalize a provider identity and synchronize it.
    pub async fn sync_identity(&self, identity: &ProviderIdentity) -> Result<UserRecord, DomainError> {
        let claims = normalize(identity);
        debug!(
            email = ?claims.email,
            name = ?claims.display_name,
            picture = ?claims.picture_url,
            "Parsed identity claims"
        );
        self.sync_claims(claims).await
    }

    /// At most one read and one write against the store; no retries.
    /// On any failure the current user is left untouched.
    #[instrument(
        name = "identity_sync.service.sync_claims",
        skip(self, claims),
        fields(email = ?claims.email)
    )]
    pub async fn sync_claims(&self, claims: IdentityClaims) -> Result<UserRecord, DomainError> {
        let Some(new_record) = claims.to_new_record() else {
            error!("No email found on identity; aborting user creation");
            return Err(DomainError::missing_identity_key());
        };

        let existing = self.lookup(&new_record.email).await?;

        let (record, event) = match existing.into_iter().next() {
            Some(found) => {
                info!(user_id = %found.id, "User already exists");
                let event = IdentityDomainEvent::UserResolved {
                    id: found.id,
                    at: Utc::now(),
                };
                (found, event)
            }
            None => {
                let inserted = self.insert(new_record).await?;
                info!(user_id = %inserted.id, "Inserted new user");
                let event = IdentityDomainEvent::UserCreated {
                    id: inserted.id,
                    email: inserted.email.clone(),
                    at: inserted.created_at,
                };
                (inserted, event)
            }
        };

        if !self.current.set(record.clone()) {
            debug!(user_id = %record.id, "Host detached; resolved user discarded");
        }
        self.events.publish(&event);
        Ok(record)
    }

    /// Logout: reset the current user without touching the store.
    #[instrument(name = "identity_sync.service.sign_out", skip(self))]
    pub fn sign_out(&self) {
        info!("User logged out");
        if self.current.clear() {
            self.events
                .publish(&IdentityDomainEvent::CurrentUserCleared { at: Utc::now() });
        }
    }

    async fn lookup(&self, email: &str) -> Result<Vec<UserRecord>, DomainError> {
        let timeout = self.config.lookup_timeout;
        match tokio::time::timeout(timeout, self.store.find_by_email(email)).await {
            Ok(Ok(rows)) => {
                debug!(matches = rows.len(), "Queried existing users");
                Ok(rows)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Error querying existing users");
                Err(DomainError::lookup_failed(format!("{e:#}")))
            }
            Err(_) => {
                error!(?timeout, "Querying existing users timed out");
                Err(DomainError::lookup_failed(format!("timed out after {timeout:?}")))
            }
        }
    }

    async fn insert(&self, record: NewUserRecord) -> Result<UserRecord, DomainError> {
        let timeout = self.config.insert_timeout;
        match tokio::time::timeout(timeout, self.store.insert(record)).await {
            Ok(Ok(inserted)) => Ok(inserted),
            Ok(Err(e)) => {
                error!(error = %e, "Error inserting user");
                Err(DomainError::insert_failed(format!("{e:#}")))
            }
            Err(_) => {
                error!(?timeout, "Inserting user timed out");
                Err(DomainError::insert_failed(format!("timed out after {timeout:?}")))
            }
        }
    }
}
