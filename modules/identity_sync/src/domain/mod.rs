pub mod bridge;
pub mod claims;
pub mod current_user;
pub mod error;
pub mod events;
pub mod ports;
pub mod repo;
pub mod service;
