//! Claim normalization: provider user object → [`IdentityClaims`].
//!
//! Providers disagree on where they put profile data. The primary provider
//! fills `user_metadata`; the secondary one nests its profile under
//! `app_metadata.provider_user_info`. Which field wins is decided by the
//! static tables below, tried in order, first non-empty value wins.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::contract::model::IdentityClaims;

/// Raw provider user object.
///
/// Parsing is lenient: a missing field, or a field of the wrong JSON type,
/// reads as absent instead of failing the whole object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderIdentity {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_object", skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<PrimaryMetadata>,
    #[serde(default, deserialize_with = "lenient_object", skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<AppMetadata>,
}

/// Primary provider profile (`user_metadata`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrimaryMetadata {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, deserialize_with = "lenient_object", skip_serializing_if = "Option::is_none")]
    pub provider_user_info: Option<SecondaryProfile>,
}

/// Secondary provider profile (`app_metadata.provider_user_info`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecondaryProfile {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryField {
    Name,
    FullName,
    Picture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryField {
    Name,
    Picture,
}

/// Where a claim value may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimSource {
    Primary(PrimaryField),
    Secondary(SecondaryField),
}

pub const DISPLAY_NAME_SOURCES: &[ClaimSource] = &[
    ClaimSource::Primary(PrimaryField::Name),
    ClaimSource::Primary(PrimaryField::FullName),
    ClaimSource::Secondary(SecondaryField::Name),
];

pub const PICTURE_SOURCES: &[ClaimSource] = &[
    ClaimSource::Primary(PrimaryField::Picture),
    ClaimSource::Secondary(SecondaryField::Picture),
];

impl ProviderIdentity {
    /// Lenient conversion from an arbitrary JSON value; never fails.
    pub fn from_json_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    /// Raw value of one claim source, if present.
    pub fn claim(&self, source: ClaimSource) -> Option<&str> {
        match source {
            ClaimSource::Primary(field) => {
                let meta = self.user_metadata.as_ref()?;
                match field {
                    PrimaryField::Name => meta.name.as_deref(),
                    PrimaryField::FullName => meta.full_name.as_deref(),
                    PrimaryField::Picture => meta.picture.as_deref(),
                }
            }
            ClaimSource::Secondary(field) => {
                let info = self.app_metadata.as_ref()?.provider_user_info.as_ref()?;
                match field {
                    SecondaryField::Name => info.name.as_deref(),
                    SecondaryField::Picture => info.picture.as_deref(),
                }
            }
        }
    }
}

/// First non-empty value among `sources`, in table order. Whitespace counts
/// as a value.
pub fn resolve_claim(identity: &ProviderIdentity, sources: &[ClaimSource]) -> Option<String> {
    sources
        .iter()
        .filter_map(|&source| identity.claim(source))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Pure; absent fields simply yield `None`.
pub fn normalize(identity: &ProviderIdentity) -> IdentityClaims {
    IdentityClaims {
        subject_id: identity.id.clone(),
        display_name: resolve_claim(identity, DISPLAY_NAME_SOURCES),
        picture_url: resolve_claim(identity, PICTURE_SOURCES),
        email: identity.email.clone().filter(|e| !e.is_empty()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .filter(serde_json::Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok()))
}
