use crate::contract::model::{NewUserRecord, UserRecord};
use async_trait::async_trait;

/// Port for the domain layer: the external user store.
/// Object-safe and async-friendly via `async_trait`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All records with this email, in store-defined order.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Vec<UserRecord>>;
    /// Insert a record; the store assigns `id` and `created_at`.
    async fn insert(&self, record: NewUserRecord) -> anyhow::Result<UserRecord>;
}
