pub mod auth;

pub use auth::{AuthChange, AuthEventKind, AuthEventSource, Session, Subscription, SubscriptionId};

/// Output port: publish domain events (no knowledge of transport).
pub trait EventPublisher<E>: Send + Sync + 'static {
    fn publish(&self, event: &E);
}
