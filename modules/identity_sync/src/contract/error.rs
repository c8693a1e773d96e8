use thiserror::Error;

use crate::domain::error::{DomainError, StoreOp};

/// Errors that are safe to expose to other modules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentitySyncError {
    #[error("Identity has no email; nothing to synchronize")]
    MissingIdentityKey,

    #[error("User store unavailable during {op}: {message}")]
    StoreUnavailable { op: StoreOp, message: String },
}

impl IdentitySyncError {
    pub fn missing_identity_key() -> Self {
        Self::MissingIdentityKey
    }

    pub fn store_unavailable(op: StoreOp, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            op,
            message: message.into(),
        }
    }
}

impl From<DomainError> for IdentitySyncError {
    fn from(domain_error: DomainError) -> Self {
        match domain_error {
            DomainError::MissingIdentityKey => Self::missing_identity_key(),
            DomainError::StoreUnavailable { op, message } => Self::store_unavailable(op, message),
        }
    }
}
