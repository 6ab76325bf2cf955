//! Configuration management for BrowserPilot.
//!
//! TOML configuration with environment variable substitution and tilde
//! expansion.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{Config, LoggingConfig, RunnerConfig, StorageConfig};
