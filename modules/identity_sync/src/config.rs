use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the identity_sync module (`modules.identity_sync`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySyncConfig {
    /// Upper bound for the existing-record lookup.
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub lookup_timeout: Duration,
    /// Upper bound for the insert of a new record.
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub insert_timeout: Duration,
    /// Enforce one record per email at the store layer.
    #[serde(default = "default_unique_email")]
    pub unique_email: bool,
}

impl Default for IdentitySyncConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: default_store_timeout(),
            insert_timeout: default_store_timeout(),
            unique_email: default_unique_email(),
        }
    }
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_unique_email() -> bool {
    true
}
