use async_trait::async_trait;

use crate::contract::{error::IdentitySyncError, model::UserRecord};
use crate::domain::claims::ProviderIdentity;

/// Public API of the identity_sync module for in-process consumers
#[async_trait]
pub trait IdentitySyncApi: Send + Sync {
    /// Ensure a user record exists for this provider identity and return it.
    async fn sync_identity(&self, identity: &ProviderIdentity)
        -> Result<UserRecord, IdentitySyncError>;

    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<UserRecord>;

    /// Forget the current user (logout).
    fn sign_out(&self);
}
