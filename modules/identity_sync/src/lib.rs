//! Identity synchronization: mirror authenticated provider identities into
//! an application user store, one record per email.

// === PUBLIC CONTRACT ===
pub mod contract;

pub use contract::{client, error, model};

// === INTERNAL MODULES ===
// Exposed for wiring (binary) and tests; external consumers should stick to
// `contract` and the module builder below.
pub mod config;
pub mod domain;
pub mod gateways;
pub mod infra;
pub mod module;

pub use module::IdentitySync;
