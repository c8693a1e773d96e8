use async_trait::async_trait;
use std::sync::Arc;

use crate::contract::{client::IdentitySyncApi, error::IdentitySyncError, model::UserRecord};
use crate::domain::claims::ProviderIdentity;
use crate::domain::service::Service;

/// Local implementation of the IdentitySyncApi trait that delegates to the domain service
pub struct IdentitySyncLocalClient {
    service: Arc<Service>,
}

impl IdentitySyncLocalClient {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl IdentitySyncApi for IdentitySyncLocalClient {
    async fn sync_identity(
        &self,
        identity: &ProviderIdentity,
    ) -> Result<UserRecord, IdentitySyncError> {
        self.service
            .sync_identity(identity)
            .await
            .map_err(Into::into)
    }

    fn current_user(&self) -> Option<UserRecord> {
        self.service.current_user()
    }

    fn sign_out(&self) {
        self.service.sign_out();
    }
}
