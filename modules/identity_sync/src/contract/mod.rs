pub mod client;
pub mod error;
pub mod model;

pub use client::IdentitySyncApi;
pub use error::IdentitySyncError;
pub use model::{IdentityClaims, NewUserRecord, UserRecord};
