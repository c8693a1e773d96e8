use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Transport-agnostic domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityDomainEvent {
    /// A new record was inserted for a first-seen email.
    UserCreated {
        id: Uuid,
        email: String,
        at: DateTime<Utc>,
    },
    /// An existing record became the current user.
    UserResolved { id: Uuid, at: DateTime<Utc> },
    /// Logout reset the current user.
    CurrentUserCleared { at: DateTime<Utc> },
}
