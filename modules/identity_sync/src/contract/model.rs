use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application user record mirrored from the auth provider.
///
/// `id` and `created_at` are owned by the store and assigned on insert.
/// `name` and `picture` are written once, at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    pub name: Option<String>,
    pub email: String,
    pub picture: Option<String>,
}

/// Canonical identity attributes extracted from a provider user object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityClaims {
    /// Opaque provider identifier; not used for matching.
    pub subject_id: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    pub email: Option<String>,
}

impl IdentityClaims {
    /// The record to insert for these claims, or `None` without an email.
    pub fn to_new_record(&self) -> Option<NewUserRecord> {
        let email = self.email.as_deref().filter(|e| !e.is_empty())?;
        Some(NewUserRecord {
            name: self.display_name.clone(),
            email: email.to_string(),
            picture: self.picture_url.clone(),
        })
    }
}
