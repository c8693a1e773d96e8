//! Shared runtime plumbing for the identity sync workspace:
//! layered configuration, logging setup, home directory handling and
//! shutdown signals.

pub mod config;
pub mod logging;
pub mod paths;
pub mod shutdown;

pub use config::{
    default_logging_config, AppConfig, CliArgs, DatabaseConfig, LoggingConfig, Section,
    ServerConfig,
};
pub use shutdown::wait_for_shutdown;
