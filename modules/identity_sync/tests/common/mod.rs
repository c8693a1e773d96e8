#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use identity_sync::domain::claims::ProviderIdentity;
use identity_sync::domain::current_user::CurrentUser;
use identity_sync::domain::events::IdentityDomainEvent;
use identity_sync::domain::ports::EventPublisher;
use identity_sync::domain::repo::UserStore;
use identity_sync::domain::service::{Service, ServiceConfig};

/// Event publisher that keeps everything it was given.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<IdentityDomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<IdentityDomainEvent> {
        self.events.lock().clone()
    }
}

impl EventPublisher<IdentityDomainEvent> for RecordingPublisher {
    fn publish(&self, event: &IdentityDomainEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn service_with(store: Arc<dyn UserStore>) -> (Service, Arc<RecordingPublisher>) {
    service_with_config(store, ServiceConfig::default())
}

pub fn service_with_config(
    store: Arc<dyn UserStore>,
    config: ServiceConfig,
) -> (Service, Arc<RecordingPublisher>) {
    let events = Arc::new(RecordingPublisher::default());
    let service = Service::new(store, events.clone(), CurrentUser::new(), config);
    (service, events)
}

pub fn google_user(email: &str, name: &str) -> ProviderIdentity {
    ProviderIdentity::from_json_value(json!({
        "id": format!("sub-{email}"),
        "email": email,
        "user_metadata": {
            "name": name,
            "picture": format!("https://img.example.com/{name}.png"),
        },
        "app_metadata": { "provider": "google" }
    }))
}
