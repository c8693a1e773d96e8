use std::fmt;
use thiserror::Error;

/// Store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Lookup,
    Insert,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreOp::Lookup => "lookup",
            StoreOp::Insert => "insert",
        })
    }
}

/// Domain-specific errors using thiserror
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Identity has no email; synchronization aborted")]
    MissingIdentityKey,

    #[error("User store {op} failed: {message}")]
    StoreUnavailable { op: StoreOp, message: String },
}

impl DomainError {
    pub fn missing_identity_key() -> Self {
        Self::MissingIdentityKey
    }

    pub fn store_unavailable(op: StoreOp, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            op,
            message: message.into(),
        }
    }

    pub fn lookup_failed(message: impl Into<String>) -> Self {
        Self::store_unavailable(StoreOp::Lookup, message)
    }

    pub fn insert_failed(message: impl Into<String>) -> Self {
        Self::store_unavailable(StoreOp::Insert, message)
    }
}
