use std::sync::Arc;

use tracing::{debug, info};

use crate::config::IdentitySyncConfig;
use crate::contract::client::IdentitySyncApi;
use crate::domain::bridge::{ActiveBridge, IdentityBridge};
use crate::domain::current_user::CurrentUser;
use crate::domain::events::IdentityDomainEvent;
use crate::domain::ports::{AuthEventSource, EventPublisher};
use crate::domain::repo::UserStore;
use crate::domain::service::{Service, ServiceConfig};
use crate::gateways::local::IdentitySyncLocalClient;
use crate::infra::storage::{InMemoryUserStore, SqliteStoreOptions, SqliteUserStore};

/// Which user store backs the module.
#[derive(Debug, Clone)]
pub enum StoreSpec {
    Memory,
    Sqlite {
        url: String,
        options: SqliteStoreOptions,
    },
}

/// Open (and migrate) the configured store.
pub async fn open_store(
    spec: &StoreSpec,
    cfg: &IdentitySyncConfig,
) -> anyhow::Result<Arc<dyn UserStore>> {
    match spec {
        StoreSpec::Memory => {
            info!(unique_email = cfg.unique_email, "Using in-memory user store");
            let store = if cfg.unique_email {
                InMemoryUserStore::with_unique_email()
            } else {
                InMemoryUserStore::new()
            };
            Ok(Arc::new(store))
        }
        StoreSpec::Sqlite { url, options } => {
            let store = SqliteUserStore::connect(url, options).await?;
            store.migrate(cfg.unique_email).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Wired identity_sync module: synchronizer service, its current-user state
/// and the bridge to the auth event source.
pub struct IdentitySync {
    service: Arc<Service>,
    bridge: IdentityBridge,
}

impl IdentitySync {
    pub fn new(
        cfg: &IdentitySyncConfig,
        store: Arc<dyn UserStore>,
        source: Arc<dyn AuthEventSource>,
        events: Arc<dyn EventPublisher<IdentityDomainEvent>>,
    ) -> Self {
        debug!(
            lookup_timeout = ?cfg.lookup_timeout,
            insert_timeout = ?cfg.insert_timeout,
            "Loaded identity_sync config"
        );
        let service = Arc::new(Service::new(
            store,
            events,
            CurrentUser::new(),
            ServiceConfig::from(cfg),
        ));
        let bridge = IdentityBridge::new(service.clone(), source);
        Self { service, bridge }
    }

    pub fn service(&self) -> Arc<Service> {
        self.service.clone()
    }

    pub fn current_user(&self) -> CurrentUser {
        self.service.current().clone()
    }

    /// In-process client for other components.
    pub fn client(&self) -> Arc<dyn IdentitySyncApi> {
        Arc::new(IdentitySyncLocalClient::new(self.service.clone()))
    }

    pub fn activate(&self) -> ActiveBridge {
        self.bridge.activate()
    }
}
