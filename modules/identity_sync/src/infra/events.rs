use tracing::info;

use crate::domain::events::IdentityDomainEvent;
use crate::domain::ports::EventPublisher;

/// Publishes domain events as structured log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl EventPublisher<IdentityDomainEvent> for TracingEventPublisher {
    fn publish(&self, event: &IdentityDomainEvent) {
        match event {
            IdentityDomainEvent::UserCreated { id, email, at } => {
                info!(target: "identity_sync::events", user_id = %id, %email, %at, "user created")
            }
            IdentityDomainEvent::UserResolved { id, at } => {
                info!(target: "identity_sync::events", user_id = %id, %at, "user resolved")
            }
            IdentityDomainEvent::CurrentUserCleared { at } => {
                info!(target: "identity_sync::events", %at, "current user cleared")
            }
        }
    }
}
